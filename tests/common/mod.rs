#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use rescue_notify_relay::build_router;
use rescue_notify_relay::firestore::{LookupError, TokenCollection, TokenStore};
use rescue_notify_relay::handlers::AppState;
use rescue_notify_relay::messaging::{
    BatchResponse, DispatchError, MulticastMessage, PushGateway, SendResponse,
};

/// In-memory token documents keyed by collection and entity id.
#[derive(Default)]
pub struct MemoryTokenStore {
    documents: HashMap<(TokenCollection, String), Vec<String>>,
    unavailable: bool,
    lookups: AtomicU64,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_tokens(mut self, collection: TokenCollection, key: &str, tokens: &[&str]) -> Self {
        self.documents.insert(
            (collection, key.to_string()),
            tokens.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn device_tokens(
        &self,
        collection: TokenCollection,
        key: &str,
    ) -> Result<Vec<String>, LookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(LookupError::StoreUnavailable("connection refused".to_string()));
        }
        match self.documents.get(&(collection, key.to_string())) {
            None => Err(LookupError::NotFound),
            Some(tokens) if tokens.is_empty() => Err(LookupError::NoTokens),
            Some(tokens) => Ok(tokens.clone()),
        }
    }
}

/// Records every multicast and reports configurable per-token outcomes.
#[derive(Default)]
pub struct RecordingGateway {
    rejected_tokens: HashSet<String>,
    broken: bool,
    sent: Mutex<Vec<MulticastMessage>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(tokens: &[&str]) -> Self {
        Self {
            rejected_tokens: tokens.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<MulticastMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn send_multicast(
        &self,
        message: &MulticastMessage,
    ) -> Result<BatchResponse, DispatchError> {
        self.sent.lock().unwrap().push(message.clone());
        if self.broken {
            return Err(DispatchError::Transport("gateway timed out".to_string()));
        }
        let responses = message
            .tokens
            .iter()
            .enumerate()
            .map(|(i, token)| {
                if self.rejected_tokens.contains(token) {
                    SendResponse::Failed {
                        error: "NOT_FOUND: Requested entity was not found.".to_string(),
                    }
                } else {
                    SendResponse::Sent {
                        message_id: format!("projects/test/messages/{}", i),
                    }
                }
            })
            .collect();
        Ok(BatchResponse::from_responses(responses))
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryTokenStore>,
    pub gateway: Arc<RecordingGateway>,
}

impl TestApp {
    pub fn new(store: MemoryTokenStore, gateway: RecordingGateway) -> Self {
        Self::with_api_key(store, gateway, None)
    }

    pub fn with_api_key(
        store: MemoryTokenStore,
        gateway: RecordingGateway,
        api_key: Option<&str>,
    ) -> Self {
        let store = Arc::new(store);
        let gateway = Arc::new(gateway);
        let state = Arc::new(AppState {
            store: store.clone(),
            gateway: gateway.clone(),
        });
        Self {
            router: build_router(state, api_key.map(str::to_string)),
            store,
            gateway,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: &str) -> (StatusCode, String) {
        self.request_with_headers(method, uri, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: &str,
        headers: &[(&str, &str)],
    ) -> (StatusCode, String) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let response = self
            .router
            .clone()
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}
