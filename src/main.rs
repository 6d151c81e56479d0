use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use citabot::config::AppConfig;
use citabot::db;
use citabot::handlers;
use citabot::services::notify::WebhookNotifier;
use citabot::services::transcribe::HttpTranscriber;
use citabot::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    if config.notify_url.is_empty() {
        tracing::warn!("NOTIFY_URL not set, operator notifications will be dropped");
    }
    let notifier = Arc::new(WebhookNotifier::new(config.notify_url.clone()));
    let transcriber = Box::new(HttpTranscriber::new(config.transcriber_url.clone()));

    let state = Arc::new(AppState::new(conn, config.clone(), notifier, transcriber));

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/webhook/message", post(handlers::webhook::message_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
