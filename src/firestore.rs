//! Device-token lookup against the Firestore REST API.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::credentials::AccessTokenSource;

pub const FIRESTORE_API_URL: &str = "https://firestore.googleapis.com/v1";

/// The two collections device tokens are registered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenCollection {
    ManagerDeviceTokens,
    CustomerDeviceTokens,
}

impl TokenCollection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManagerDeviceTokens => "manager-device-tokens",
            Self::CustomerDeviceTokens => "customer-device-tokens",
        }
    }
}

impl fmt::Display for TokenCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no data found")]
    NotFound,

    #[error("no tokens found")]
    NoTokens,

    #[error("malformed token record: {0}")]
    MalformedRecord(String),

    #[error("document store unavailable: {0}")]
    StoreUnavailable(String),
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Tokens stored under `key`, in stored order.
    async fn device_tokens(
        &self,
        collection: TokenCollection,
        key: &str,
    ) -> Result<Vec<String>, LookupError>;
}

pub struct FirestoreClient {
    base_url: String,
    project_id: String,
    tokens: Arc<dyn AccessTokenSource>,
    http: reqwest::Client,
}

impl FirestoreClient {
    pub fn new(
        project_id: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
        http: reqwest::Client,
    ) -> Self {
        Self::with_base_url(FIRESTORE_API_URL, project_id, tokens, http)
    }

    /// Point the client at another host, e.g. `http://localhost:8081/v1` for the emulator.
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

    fn document_url(&self, collection: TokenCollection, key: &str) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}/{}",
            self.base_url, self.project_id, collection, key
        )
    }
}

#[async_trait]
impl TokenStore for FirestoreClient {
    async fn device_tokens(
        &self,
        collection: TokenCollection,
        key: &str,
    ) -> Result<Vec<String>, LookupError> {
        let access_token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;

        let url = self.document_url(collection, key);
        debug!("Fetching device tokens from {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(not_found_error(&body));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::StoreUnavailable(format!(
                "Firestore returned {}: {}",
                status, body
            )));
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;
        tokens_from_document(&document)
    }
}

/// A 404 means a missing document, unless Firestore says the database itself
/// does not exist.
pub fn not_found_error(body: &str) -> LookupError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message")?.as_str().map(str::to_string))
        .unwrap_or_default();
    if message.contains("database") && message.contains("does not exist") {
        LookupError::StoreUnavailable(format!("Firestore returned 404 Not Found: {}", message))
    } else {
        LookupError::NotFound
    }
}

/// Extracts `fields.tokens` from a Firestore document resource.
pub fn tokens_from_document(document: &Value) -> Result<Vec<String>, LookupError> {
    let field = match document.pointer("/fields/tokens") {
        None => return Err(LookupError::NoTokens),
        Some(field) if field.get("nullValue").is_some() => return Err(LookupError::NoTokens),
        Some(field) => field,
    };

    let array = field.get("arrayValue").ok_or_else(|| {
        LookupError::MalformedRecord("tokens field is not an array".to_string())
    })?;

    let values = match array.get("values").and_then(Value::as_array) {
        Some(values) if !values.is_empty() => values,
        _ => return Err(LookupError::NoTokens),
    };

    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            value
                .get("stringValue")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| LookupError::MalformedRecord(format!("token {} is not a string", i)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_names() {
        assert_eq!(TokenCollection::ManagerDeviceTokens.to_string(), "manager-device-tokens");
        assert_eq!(TokenCollection::CustomerDeviceTokens.to_string(), "customer-device-tokens");
    }

    #[test]
    fn tokens_keep_stored_order_and_duplicates() {
        let document = json!({
            "name": "projects/p/databases/(default)/documents/manager-device-tokens/7",
            "fields": {
                "tokens": {"arrayValue": {"values": [
                    {"stringValue": "tokB"},
                    {"stringValue": "tokA"},
                    {"stringValue": "tokB"}
                ]}}
            }
        });
        assert_eq!(tokens_from_document(&document).unwrap(), vec!["tokB", "tokA", "tokB"]);
    }

    #[test]
    fn missing_or_null_tokens_field() {
        let missing = json!({"fields": {"other": {"stringValue": "x"}}});
        assert!(matches!(tokens_from_document(&missing), Err(LookupError::NoTokens)));

        let no_fields = json!({"name": "doc"});
        assert!(matches!(tokens_from_document(&no_fields), Err(LookupError::NoTokens)));

        let null = json!({"fields": {"tokens": {"nullValue": null}}});
        assert!(matches!(tokens_from_document(&null), Err(LookupError::NoTokens)));
    }

    #[test]
    fn empty_array_has_no_tokens() {
        let document = json!({"fields": {"tokens": {"arrayValue": {}}}});
        assert!(matches!(tokens_from_document(&document), Err(LookupError::NoTokens)));
    }

    #[test]
    fn non_string_entry_is_malformed() {
        let document = json!({"fields": {"tokens": {"arrayValue": {"values": [
            {"stringValue": "tokA"},
            {"integerValue": "12"}
        ]}}}});
        let err = tokens_from_document(&document).unwrap_err();
        assert_eq!(err.to_string(), "malformed token record: token 1 is not a string");
    }

    #[test]
    fn missing_database_is_not_a_missing_document() {
        let missing_doc = r#"{"error": {"code": 404, "status": "NOT_FOUND",
            "message": "Document \"projects/p/databases/(default)/documents/manager-device-tokens/7\" not found."}}"#;
        assert!(matches!(not_found_error(missing_doc), LookupError::NotFound));
        assert!(matches!(not_found_error(""), LookupError::NotFound));

        let missing_db = r#"{"error": {"code": 404, "status": "NOT_FOUND",
            "message": "The database (default) does not exist for project p"}}"#;
        let err = not_found_error(missing_db);
        assert!(matches!(err, LookupError::StoreUnavailable(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn error_texts() {
        assert_eq!(LookupError::NotFound.to_string(), "no data found");
        assert_eq!(LookupError::NoTokens.to_string(), "no tokens found");
    }
}
