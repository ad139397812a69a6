use std::sync::Arc;

use anyhow::Context;
use log::info;

use rescue_notify_relay::build_router;
use rescue_notify_relay::config::Config;
use rescue_notify_relay::credentials::{
    AccessTokenSource, ServiceAccount, ServiceAccountTokens, StaticToken,
};
use rescue_notify_relay::firestore::{FirestoreClient, TokenStore};
use rescue_notify_relay::handlers::AppState;
use rescue_notify_relay::messaging::{FcmClient, PushGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&filters)
        .init();

    let config = Config::from_env()?;

    info!("Loading credentials from {}", config.credentials_path.display());
    let account = ServiceAccount::from_file(&config.credentials_path)
        .context("error initializing app")?;
    info!("Project: {} ({})", account.project_id, account.client_email);

    let http = reqwest::Client::new();
    let tokens: Arc<dyn AccessTokenSource> = Arc::new(
        ServiceAccountTokens::new(&account, http.clone())
            .context("error initializing credentials")?,
    );

    let store: Arc<dyn TokenStore> = match &config.firestore_emulator_host {
        Some(host) => {
            info!("Using Firestore emulator at {}", host);
            Arc::new(FirestoreClient::with_base_url(
                format!("http://{}/v1", host),
                account.project_id.clone(),
                Arc::new(StaticToken("owner".to_string())),
                http.clone(),
            ))
        }
        None => Arc::new(FirestoreClient::new(
            account.project_id.clone(),
            tokens.clone(),
            http.clone(),
        )),
    };
    let gateway: Arc<dyn PushGateway> =
        Arc::new(FcmClient::new(account.project_id.clone(), tokens, http));

    let state = Arc::new(AppState { store, gateway });
    if config.api_key.is_some() {
        info!("Bearer key required on all requests");
    }
    let app = build_router(state, config.api_key.clone());

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
