use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::firestore::LookupError;
use crate::messaging::DispatchError;
use crate::types::{RelayResponse, ResponseStatus};

/// Anything that stops an event from being relayed. Every variant is reported
/// to the caller as a 400 carrying the underlying error text.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    Validation(#[from] serde_json::Error),

    /// `status` is the label written into the response body.
    #[error("{source}")]
    Lookup {
        source: LookupError,
        status: ResponseStatus,
    },

    #[error("{0}")]
    Dispatch(#[from] DispatchError),
}

impl RelayError {
    pub fn response_status(&self) -> ResponseStatus {
        match self {
            Self::Lookup { status, .. } => *status,
            Self::Validation(_) | Self::Dispatch(_) => ResponseStatus::Error,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = RelayResponse::failed(self.response_status(), self.to_string());
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}
