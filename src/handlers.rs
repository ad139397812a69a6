use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use log::{info, warn};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::compose::{self, Notification};
use crate::error::RelayError;
use crate::firestore::{TokenCollection, TokenStore};
use crate::messaging::{MulticastMessage, PushGateway};
use crate::types::{
    CustomerCancelRequest, GarageRejectRequest, HelloResponse, RelayResponse, RescueRequest,
    ResponseStatus, StatusChangeRequest,
};

pub struct AppState {
    pub store: Arc<dyn TokenStore>,
    pub gateway: Arc<dyn PushGateway>,
}

/// A workflow event that is relayed as one push notification to the
/// counterpart party's devices.
pub trait RescueEvent: DeserializeOwned + Send {
    const KIND: &'static str;

    /// Collection and document key holding the recipients' tokens.
    fn recipients(&self) -> (TokenCollection, String);

    fn notification(&self) -> Notification;

    /// Label written into the body when token lookup fails.
    fn lookup_failure_status() -> ResponseStatus {
        ResponseStatus::Error
    }
}

impl RescueEvent for RescueRequest {
    const KIND: &'static str = "rescue";

    fn recipients(&self) -> (TokenCollection, String) {
        (TokenCollection::ManagerDeviceTokens, self.garage_id.to_string())
    }

    fn notification(&self) -> Notification {
        compose::rescue_created(&self.description)
    }
}

impl RescueEvent for StatusChangeRequest {
    const KIND: &'static str = "status";

    fn recipients(&self) -> (TokenCollection, String) {
        (TokenCollection::CustomerDeviceTokens, self.customer_id.to_string())
    }

    fn notification(&self) -> Notification {
        compose::status_changed(self.status)
    }

    // Existing clients of the status endpoint read "success" here alongside the 400.
    fn lookup_failure_status() -> ResponseStatus {
        ResponseStatus::Success
    }
}

impl RescueEvent for GarageRejectRequest {
    const KIND: &'static str = "garage-reject";

    fn recipients(&self) -> (TokenCollection, String) {
        (TokenCollection::CustomerDeviceTokens, self.customer_id.to_string())
    }

    fn notification(&self) -> Notification {
        compose::garage_rejected(&self.reject_reason)
    }
}

impl RescueEvent for CustomerCancelRequest {
    const KIND: &'static str = "customer-cancel";

    fn recipients(&self) -> (TokenCollection, String) {
        (TokenCollection::ManagerDeviceTokens, self.garage_id.to_string())
    }

    fn notification(&self) -> Notification {
        compose::customer_cancelled(&self.reject_reason)
    }
}

/// Parse, look up recipients, compose, dispatch.
pub async fn relay<E: RescueEvent>(
    state: &AppState,
    body: &[u8],
    request_id: Uuid,
) -> Result<RelayResponse, RelayError> {
    let event: E = serde_json::from_slice(body)?;

    let (collection, key) = event.recipients();
    let tokens = state
        .store
        .device_tokens(collection, &key)
        .await
        .map_err(|source| RelayError::Lookup {
            source,
            status: E::lookup_failure_status(),
        })?;

    let message = MulticastMessage::new(tokens, event.notification());
    let batch = state.gateway.send_multicast(&message).await?;

    info!(
        "[{}] {} event relayed to {}/{}: {} sent, {} failed",
        request_id,
        E::KIND,
        collection,
        key,
        batch.success_count,
        batch.failure_count
    );

    Ok(RelayResponse::delivered(batch.success_count))
}

async fn respond<E: RescueEvent>(
    state: &AppState,
    body: &[u8],
) -> Result<Json<RelayResponse>, RelayError> {
    let request_id = Uuid::new_v4();
    match relay::<E>(state, body, request_id).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            warn!("[{}] {} event not relayed: {}", request_id, E::KIND, e);
            Err(e)
        }
    }
}

pub async fn hello() -> Json<HelloResponse> {
    Json(HelloResponse { message: "hello" })
}

pub async fn new_rescue(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<RelayResponse>, RelayError> {
    respond::<RescueRequest>(&state, &body).await
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<RelayResponse>, RelayError> {
    respond::<StatusChangeRequest>(&state, &body).await
}

pub async fn garage_reject(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<RelayResponse>, RelayError> {
    respond::<GarageRejectRequest>(&state, &body).await
}

pub async fn customer_cancel(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<RelayResponse>, RelayError> {
    respond::<CustomerCancelRequest>(&state, &body).await
}
