//! Data endpoints: upload, listing, and direct tabular operations.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::data::{plot, DataFrame};
use crate::store::Session;

use super::types::{
    AggregateRequest, ApiError, DataResponse, DatasetListItem, DatasetListResponse,
    DescribeRequest, FilterRequest, PlotRequest, PlotResponse, StatsResponse,
    UploadDataResponse,
};
use super::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/upload", post(upload_data))
        .route("/list", get(list_datasets))
        .route("/filter", post(filter_endpoint))
        .route("/aggregate", post(aggregate_endpoint))
        .route("/describe", post(describe_endpoint))
        .route("/plot", post(plot_endpoint))
}

/// Resolve a frame by explicit id or fall back to the active dataset.
fn resolve_frame<'a>(
    session: &'a Session,
    file_id: Option<&'a str>,
) -> Result<&'a DataFrame, ApiError> {
    session
        .frame(file_id)
        .map(|(_, frame)| frame)
        .ok_or_else(|| ApiError::not_found("No dataset found. Upload a file first."))
}

// ─────────────────────────────────────────────────────────────────────────────
// Upload
// ─────────────────────────────────────────────────────────────────────────────

async fn upload_data(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadDataResponse>, ApiError> {
    let mut payload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| ApiError::bad_request("No filename provided."))?;
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
            payload = Some((filename, bytes.to_vec()));
        }
    }

    let (filename, bytes) =
        payload.ok_or_else(|| ApiError::bad_request("Missing 'file' field."))?;

    let frame = DataFrame::from_csv(&bytes, &filename)
        .map_err(|e| ApiError::bad_request(format!("Failed to parse file: {}", e)))?;

    let file_id = short_id();
    let response = UploadDataResponse {
        file_id: file_id.clone(),
        filename: filename.clone(),
        columns: frame.columns().to_vec(),
        row_count: frame.row_count(),
        preview: frame.records(5),
    };

    tracing::info!(file_id = %file_id, filename = %filename, rows = response.row_count, "dataset uploaded");
    state
        .session
        .write()
        .await
        .insert_dataset(file_id, filename, frame);

    Ok(Json(response))
}

/// 12-hex dataset/document handle.
pub(super) fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Listing & tabular operations
// ─────────────────────────────────────────────────────────────────────────────

async fn list_datasets(State(state): State<Arc<AppState>>) -> Json<DatasetListResponse> {
    let session = state.session.read().await;
    let mut datasets: Vec<DatasetListItem> = session
        .dataset_meta()
        .iter()
        .map(|(id, meta)| DatasetListItem {
            file_id: id.clone(),
            filename: meta.filename.clone(),
            columns: meta.columns.clone(),
            row_count: meta.row_count,
        })
        .collect();
    datasets.sort_by(|a, b| a.file_id.cmp(&b.file_id));

    Json(DatasetListResponse {
        datasets,
        active_dataset_id: session.active_dataset_id().map(str::to_string),
    })
}

async fn filter_endpoint(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FilterRequest>,
) -> Result<Json<DataResponse>, ApiError> {
    let session = state.session.read().await;
    let frame = resolve_frame(&session, req.file_id.as_deref())?;
    let result = frame
        .filter(&req.conditions)
        .map_err(|e| ApiError::bad_request(format!("Filter error: {}", e)))?;
    Ok(Json(DataResponse {
        data: result.records(100),
        columns: result.columns().to_vec(),
        row_count: result.row_count(),
    }))
}

async fn aggregate_endpoint(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AggregateRequest>,
) -> Result<Json<DataResponse>, ApiError> {
    let session = state.session.read().await;
    let frame = resolve_frame(&session, req.file_id.as_deref())?;
    let result = frame
        .aggregate(&req.group_column, &req.value_column, &req.agg_func)
        .map_err(|e| ApiError::bad_request(format!("Aggregation error: {}", e)))?;
    let rows = result.row_count();
    Ok(Json(DataResponse {
        data: result.records(rows),
        columns: result.columns().to_vec(),
        row_count: rows,
    }))
}

async fn describe_endpoint(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DescribeRequest>,
) -> Result<Json<StatsResponse>, ApiError> {
    let session = state.session.read().await;
    let frame = resolve_frame(&session, req.file_id.as_deref())?;
    Ok(Json(StatsResponse {
        statistics: frame.describe(),
    }))
}

async fn plot_endpoint(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlotRequest>,
) -> Result<Json<PlotResponse>, ApiError> {
    let session = state.session.read().await;
    let frame = resolve_frame(&session, req.file_id.as_deref())?;
    let chart = plot::generate(
        frame,
        &req.plot_type,
        &req.x_column,
        req.y_column.as_deref(),
        req.title.as_deref(),
    )
    .map_err(|e| ApiError::bad_request(format!("Plot error: {}", e)))?;
    Ok(Json(PlotResponse {
        chart,
        plot_type: req.plot_type,
    }))
}
