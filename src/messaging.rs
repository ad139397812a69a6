//! Multicast push dispatch through the FCM HTTP v1 API.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::warn;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compose::Notification;
use crate::credentials::AccessTokenSource;

pub const FCM_API_URL: &str = "https://fcm.googleapis.com";

/// Upper bound on recipients of a single multicast.
pub const MAX_MULTICAST_TOKENS: usize = 500;

/// Sends in flight at once for one multicast.
pub const MAX_CONCURRENT_SENDS: usize = 32;

/// FCM error code for a token registered under another sender.
const SENDER_ID_MISMATCH: &str = "SENDER_ID_MISMATCH";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid multicast message: {0}")]
    InvalidMessage(String),

    #[error("messaging gateway rejected credentials ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("messaging gateway unreachable: {0}")]
    Transport(String),

    #[error("failed to obtain access token: {0}")]
    Credentials(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastMessage {
    pub tokens: Vec<String>,
    pub notification: Notification,
}

impl MulticastMessage {
    pub fn new(tokens: Vec<String>, notification: Notification) -> Self {
        Self {
            tokens,
            notification,
        }
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.tokens.is_empty() {
            return Err(DispatchError::InvalidMessage(
                "tokens must not be empty".to_string(),
            ));
        }
        if self.tokens.len() > MAX_MULTICAST_TOKENS {
            return Err(DispatchError::InvalidMessage(format!(
                "tokens must not contain more than {} tokens",
                MAX_MULTICAST_TOKENS
            )));
        }
        Ok(())
    }
}

/// Outcome for a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResponse {
    Sent { message_id: String },
    Failed { error: String },
}

impl SendResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResponse {
    pub success_count: usize,
    pub failure_count: usize,
    pub responses: Vec<SendResponse>,
}

impl BatchResponse {
    pub fn from_responses(responses: Vec<SendResponse>) -> Self {
        let success_count = responses.iter().filter(|r| r.is_success()).count();
        Self {
            success_count,
            failure_count: responses.len() - success_count,
            responses,
        }
    }
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send_multicast(
        &self,
        message: &MulticastMessage,
    ) -> Result<BatchResponse, DispatchError>;
}

#[derive(Debug, Serialize)]
struct FcmRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Debug, Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: FcmNotification<'a>,
    data: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct FcmErrorBody {
    error: FcmError,
}

#[derive(Debug, Deserialize)]
struct FcmError {
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct FcmErrorDetail {
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
}

struct GatewayError {
    text: String,
    error_code: Option<String>,
}

fn parse_error(status: StatusCode, body: &str) -> GatewayError {
    match serde_json::from_str::<FcmErrorBody>(body) {
        Ok(parsed) => {
            let error_code = parsed
                .error
                .details
                .into_iter()
                .find_map(|detail| detail.error_code);
            let text = if parsed.error.status.is_empty() {
                parsed.error.message
            } else {
                format!("{}: {}", parsed.error.status, parsed.error.message)
            };
            GatewayError { text, error_code }
        }
        Err(_) => GatewayError {
            text: format!("FCM returned {}: {}", status, body),
            error_code: None,
        },
    }
}

/// 401, and 403 other than a sender mismatch, mean our credentials are bad.
fn is_credential_failure(status: StatusCode, error: &GatewayError) -> bool {
    status == StatusCode::UNAUTHORIZED
        || (status == StatusCode::FORBIDDEN
            && error.error_code.as_deref() != Some(SENDER_ID_MISMATCH))
}

pub struct FcmClient {
    base_url: String,
    project_id: String,
    tokens: Arc<dyn AccessTokenSource>,
    http: reqwest::Client,
}

impl FcmClient {
    pub fn new(
        project_id: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
        http: reqwest::Client,
    ) -> Self {
        Self::with_base_url(FCM_API_URL, project_id, tokens, http)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            tokens,
            http,
        }
    }

    async fn send_one(
        &self,
        url: &str,
        access_token: &str,
        token: &str,
        notification: &Notification,
    ) -> Result<SendResponse, DispatchError> {
        let request = FcmRequest {
            message: FcmMessage {
                token,
                notification: FcmNotification {
                    title: &notification.title,
                    body: &notification.body,
                },
                data: &notification.data,
            },
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let sent: FcmResponse = response
                .json()
                .await
                .map_err(|e| DispatchError::Transport(e.to_string()))?;
            return Ok(SendResponse::Sent {
                message_id: sent.name,
            });
        }

        let body = response.text().await.unwrap_or_default();
        let error = parse_error(status, &body);
        if is_credential_failure(status, &error) {
            return Err(DispatchError::Unauthorized {
                status: status.as_u16(),
                message: error.text,
            });
        }

        warn!("FCM rejected token {}: {}", token, error.text);
        Ok(SendResponse::Failed { error: error.text })
    }
}

#[async_trait]
impl PushGateway for FcmClient {
    async fn send_multicast(
        &self,
        message: &MulticastMessage,
    ) -> Result<BatchResponse, DispatchError> {
        message.validate()?;

        let access_token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| DispatchError::Credentials(e.to_string()))?;

        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.base_url, self.project_id
        );

        // The first send doubles as a credentials check: if it cannot get
        // through, nothing has been delivered and the whole multicast fails.
        let (first, rest) = match message.tokens.split_first() {
            Some(split) => split,
            None => return Ok(BatchResponse::from_responses(Vec::new())),
        };
        let notification = &message.notification;
        let first_response = self
            .send_one(&url, &access_token, first, notification)
            .await?;

        let rest_sends: Vec<_> = rest
            .iter()
            .map(|token| self.send_one(&url, &access_token, token, notification))
            .collect();
        let rest_results: Vec<Result<SendResponse, DispatchError>> = stream::iter(rest_sends)
            .buffered(MAX_CONCURRENT_SENDS)
            .collect()
            .await;

        let mut responses = Vec::with_capacity(message.tokens.len());
        responses.push(first_response);
        let mut gateway_error = None;
        for (token, result) in rest.iter().zip(rest_results) {
            match result {
                Ok(response) => responses.push(response),
                Err(e) => {
                    warn!("Send to token {} failed: {}", token, e);
                    responses.push(SendResponse::Failed {
                        error: e.to_string(),
                    });
                    if gateway_error.is_none() {
                        gateway_error = Some(e);
                    }
                }
            }
        }

        let batch = BatchResponse::from_responses(responses);
        match gateway_error {
            Some(e) if batch.success_count == 0 => Err(e),
            _ => Ok(batch),
        }
    }
}
