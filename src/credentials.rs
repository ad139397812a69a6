//! Service-account credentials and the bearer tokens derived from them.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested for both the document store and the messaging gateway.
pub const SCOPES: &str =
    "https://www.googleapis.com/auth/datastore https://www.googleapis.com/auth/firebase.messaging";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("failed to read credentials file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid credentials file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported credentials type \"{0}\", expected \"service_account\"")]
    UnsupportedType(String),

    #[error("invalid private key: {0}")]
    Key(#[from] jsonwebtoken::errors::Error),

    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    #[serde(rename = "type")]
    pub kind: String,
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccount {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CredentialsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CredentialsError> {
        let account: Self = serde_json::from_str(raw)?;
        if account.kind != "service_account" {
            return Err(CredentialsError::UnsupportedType(account.kind));
        }
        Ok(account)
    }
}

#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, CredentialsError>;
}

/// A fixed bearer token, as accepted by local emulators.
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, CredentialsError> {
        Ok(self.0.clone())
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    token: String,
    expires_at: i64,
}

/// OAuth2 JWT-bearer grant for a service account. Tokens are cached until
/// shortly before they expire.
pub struct ServiceAccountTokens {
    client_email: String,
    private_key_id: String,
    token_uri: String,
    key: EncodingKey,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokens {
    pub fn new(account: &ServiceAccount, http: reqwest::Client) -> Result<Self, CredentialsError> {
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())?;
        Ok(Self {
            client_email: account.client_email.clone(),
            private_key_id: account.private_key_id.clone(),
            token_uri: account.token_uri.clone(),
            key,
            http,
            cached: Mutex::new(None),
        })
    }

    fn assertion(&self, now: i64) -> Result<String, CredentialsError> {
        let mut header = Header::new(Algorithm::RS256);
        if !self.private_key_id.is_empty() {
            header.kid = Some(self.private_key_id.clone());
        }
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: SCOPES,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        Ok(jsonwebtoken::encode(&header, &claims, &self.key)?)
    }

    async fn fetch(&self, now: i64) -> Result<CachedToken, CredentialsError> {
        let assertion = self.assertion(now)?;
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialsError::Rejected { status, body });
        }

        let token: TokenResponse = response.json().await?;
        debug!("Obtained access token for {} ({}s)", self.client_email, token.expires_in);
        Ok(CachedToken {
            token: token.access_token,
            expires_at: now + token.expires_in,
        })
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountTokens {
    async fn access_token(&self) -> Result<String, CredentialsError> {
        let now = Utc::now().timestamp();
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - EXPIRY_MARGIN_SECS > now {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.fetch(now).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}
