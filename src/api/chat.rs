//! Chat endpoints: message handling, history, clear.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use super::types::{ApiError, ChatHistoryResponse, ChatMessageRequest, ChatMessageResponse};
use super::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/message", post(send_message))
        .route("/history", get(get_history))
        .route("/clear", post(clear_history))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatMessageRequest>,
) -> Result<Json<ChatMessageResponse>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(ApiError::bad_request("Message cannot be empty."));
    }

    let outcome = state.agent.process_message(&state.session, &req.message).await;

    Ok(Json(ChatMessageResponse {
        text: outcome.text,
        chart: outcome.chart,
        table_data: outcome.table_data,
        table_columns: outcome.table_columns,
    }))
}

async fn get_history(State(state): State<Arc<AppState>>) -> Json<ChatHistoryResponse> {
    let session = state.session.read().await;
    Json(ChatHistoryResponse {
        history: session.history().to_vec(),
    })
}

async fn clear_history(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.session.write().await.clear();
    Json(serde_json::json!({ "status": "cleared" }))
}
