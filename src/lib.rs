pub mod compose;
pub mod config;
pub mod credentials;
pub mod error;
pub mod firestore;
pub mod handlers;
pub mod messaging;
pub mod types;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use handlers::AppState;

async fn auth_middleware(
    State(api_key): State<Option<Arc<str>>>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, StatusCode> {
    let Some(api_key) = api_key else {
        return Ok(next.run(req).await);
    };

    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth_header.strip_prefix("Bearer ").unwrap_or(auth_header);

    if token == &*api_key {
        Ok(next.run(req).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

pub fn build_router(state: Arc<AppState>, api_key: Option<String>) -> Router {
    let api_key: Option<Arc<str>> = api_key.map(Into::into);

    Router::new()
        .route("/", get(handlers::hello))
        .route("/rescues", post(handlers::new_rescue))
        .route("/rescues/status", put(handlers::change_status))
        .route("/rescues/garage-reject", put(handlers::garage_reject))
        .route("/rescues/customer-cancel", put(handlers::customer_cancel))
        .layer(middleware::from_fn_with_state(api_key, auth_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
