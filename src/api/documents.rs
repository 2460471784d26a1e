//! Document endpoints: upload, search, and listing.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    routing::{get, post},
    Json, Router,
};

use crate::kb::chunk_text;
use crate::store::DocumentMeta;

use super::types::{
    ApiError, DocListItem, DocListResponse, DocSearchRequest, DocSearchResponse,
    DocUploadResponse,
};
use super::AppState;

const CHUNK_SIZE: usize = 500;
const CHUNK_OVERLAP: usize = 50;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/upload", post(upload_document))
        .route("/search", post(search_documents))
        .route("/list", get(list_documents))
}

async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<DocUploadResponse>, ApiError> {
    let mut payload: Option<(String, String)> = None;

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
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
            payload = Some((filename, text));
        }
    }

    let (filename, text) =
        payload.ok_or_else(|| ApiError::bad_request("Missing 'file' field."))?;

    if text.trim().is_empty() {
        return Err(ApiError::bad_request("Document contains no text."));
    }

    let chunks = chunk_text(&text, CHUNK_SIZE, CHUNK_OVERLAP);
    let doc_id = super::data::short_id();

    let mut session = state.session.write().await;
    let num_chunks = session.kb.add(&doc_id, &filename, &chunks);
    session.documents.insert(
        doc_id.clone(),
        DocumentMeta {
            name: filename.clone(),
            num_chunks,
        },
    );
    tracing::info!(doc_id = %doc_id, filename = %filename, chunks = num_chunks, "document indexed");

    Ok(Json(DocUploadResponse {
        doc_id,
        filename,
        num_chunks,
    }))
}

async fn search_documents(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DocSearchRequest>,
) -> Json<DocSearchResponse> {
    let session = state.session.read().await;
    Json(DocSearchResponse {
        results: session.kb.search(&req.query, req.top_k),
    })
}

async fn list_documents(State(state): State<Arc<AppState>>) -> Json<DocListResponse> {
    let session = state.session.read().await;
    let mut documents: Vec<DocListItem> = session
        .documents
        .iter()
        .map(|(id, meta)| DocListItem {
            doc_id: id.clone(),
            meta: meta.clone(),
        })
        .collect();
    documents.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
    Json(DocListResponse { documents })
}
