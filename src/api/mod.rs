//! HTTP boundary. Thin handlers over the session, the data engine, and the
//! agent; all orchestration logic lives below this layer.

mod chat;
mod data;
mod documents;
pub mod types;

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::agent::Agent;
use crate::config::Config;
use crate::llm::MistralClient;
use crate::store::Session;

/// Shared application state.
pub struct AppState {
    pub session: RwLock<Session>,
    pub agent: Agent,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let llm = Arc::new(MistralClient::new(config.api_key.clone()));
        Self {
            session: RwLock::new(Session::new()),
            agent: Agent::new(config, llm),
        }
    }
}

/// Build the full application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/chat", chat::routes())
        .nest("/api/data", data::routes())
        .nest("/api/documents", documents::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(&config));
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
