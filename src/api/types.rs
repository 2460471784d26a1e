//! Request/response types for the HTTP API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data::ChartSpec;
use crate::kb::SearchHit;
use crate::store::{DocumentMeta, Turn};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// API error carrying an HTTP status and a detail message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, detail: detail.into() }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, detail: detail.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.detail });
        (self.status, Json(body)).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatMessageResponse {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_data: Option<Vec<Map<String, Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_columns: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub history: Vec<Turn>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Data
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UploadDataResponse {
    pub file_id: String,
    pub filename: String,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub preview: Vec<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct DatasetListItem {
    pub file_id: String,
    pub filename: String,
    pub columns: Vec<String>,
    pub row_count: usize,
}

#[derive(Debug, Serialize)]
pub struct DatasetListResponse {
    pub datasets: Vec<DatasetListItem>,
    pub active_dataset_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    pub conditions: String,
    #[serde(default)]
    pub file_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AggregateRequest {
    pub group_column: String,
    pub value_column: String,
    pub agg_func: String,
    #[serde(default)]
    pub file_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DescribeRequest {
    #[serde(default)]
    pub file_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlotRequest {
    pub plot_type: String,
    pub x_column: String,
    #[serde(default)]
    pub y_column: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub file_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DataResponse {
    pub data: Vec<Map<String, Value>>,
    pub columns: Vec<String>,
    pub row_count: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub statistics: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct PlotResponse {
    pub chart: ChartSpec,
    pub plot_type: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Documents
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct DocUploadResponse {
    pub doc_id: String,
    pub filename: String,
    pub num_chunks: usize,
}

#[derive(Debug, Deserialize)]
pub struct DocSearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Serialize)]
pub struct DocSearchResponse {
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Serialize)]
pub struct DocListItem {
    pub doc_id: String,
    #[serde(flatten)]
    pub meta: DocumentMeta,
}

#[derive(Debug, Serialize)]
pub struct DocListResponse {
    pub documents: Vec<DocListItem>,
}
