//! Integration tests for the HTTP layer, driven through the router without
//! binding a socket. Chat endpoints that need a live model provider are
//! covered by the agent unit tests instead.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use lab_copilot::api::{app, AppState};
use lab_copilot::config::Config;

fn test_app() -> Router {
    let config = Config::new("test-key".to_string(), "test-model".to_string());
    app(Arc::new(AppState::new(&config)))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn multipart_file(filename: &str, content: &str) -> (String, Body) {
    let boundary = "test-boundary-7MA4YWxkTrZu0gW";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n{content}\r\n--{boundary}--\r\n"
    );
    (
        format!("multipart/form-data; boundary={boundary}"),
        Body::from(body),
    )
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn upload_csv(app: &Router, csv: &str) -> Value {
    let (content_type, body) = multipart_file("cells.csv", csv);
    let request = Request::builder()
        .method("POST")
        .uri("/api/data/upload")
        .header(header::CONTENT_TYPE, content_type)
        .body(body)
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

const CSV: &str = "sample,viability,treatment\nA1,0.91,control\nA2,0.42,drug_a\nA3,0.88,control\nA4,0.35,drug_a\n";

#[tokio::test]
async fn health_reports_ok() {
    let response = test_app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn upload_returns_schema_and_preview() {
    let app = test_app();
    let json = upload_csv(&app, CSV).await;

    assert_eq!(json["filename"], "cells.csv");
    assert_eq!(json["row_count"], 4);
    assert_eq!(json["columns"], serde_json::json!(["sample", "viability", "treatment"]));
    assert_eq!(json["file_id"].as_str().unwrap().len(), 12);
    assert_eq!(json["preview"].as_array().unwrap().len(), 4);
    assert_eq!(json["preview"][0]["viability"], 0.91);
}

#[tokio::test]
async fn upload_activates_dataset_in_list() {
    let app = test_app();
    let uploaded = upload_csv(&app, CSV).await;

    let response = app
        .oneshot(Request::get("/api/data/list").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["active_dataset_id"], uploaded["file_id"]);
    assert_eq!(json["datasets"].as_array().unwrap().len(), 1);
    assert_eq!(json["datasets"][0]["filename"], "cells.csv");
}

#[tokio::test]
async fn filter_without_dataset_is_404() {
    let response = test_app()
        .oneshot(json_request("/api/data/filter", serde_json::json!({"conditions": "viability > 0.5"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["detail"], "No dataset found. Upload a file first.");
}

#[tokio::test]
async fn filter_returns_matching_rows() {
    let app = test_app();
    upload_csv(&app, CSV).await;

    let response = app
        .oneshot(json_request("/api/data/filter", serde_json::json!({"conditions": "treatment == 'control'"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["row_count"], 2);
    assert_eq!(json["data"][0]["sample"], "A1");
}

#[tokio::test]
async fn filter_preview_caps_at_100_rows() {
    let mut csv = String::from("id,value\n");
    for i in 0..150 {
        csv.push_str(&format!("{},{}\n", i, i * 2));
    }
    let app = test_app();
    upload_csv(&app, &csv).await;

    let response = app
        .oneshot(json_request("/api/data/filter", serde_json::json!({"conditions": "value >= 0"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 100);
    assert_eq!(json["row_count"], 150);
}

#[tokio::test]
async fn bad_filter_is_400_with_detail() {
    let app = test_app();
    upload_csv(&app, CSV).await;

    let response = app
        .oneshot(json_request("/api/data/filter", serde_json::json!({"conditions": "no_such_column > 1"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["detail"].as_str().unwrap().starts_with("Filter error:"));
}

#[tokio::test]
async fn aggregate_groups_by_column() {
    let app = test_app();
    upload_csv(&app, CSV).await;

    let request = json_request(
        "/api/data/aggregate",
        serde_json::json!({
            "group_column": "treatment",
            "value_column": "viability",
            "agg_func": "mean",
        }),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["row_count"], 2);
    // Groups come back in deterministic order.
    assert_eq!(json["data"][0]["treatment"], "control");
    assert_eq!(json["data"][0]["viability"], 0.895);
}

#[tokio::test]
async fn describe_and_plot_round() {
    let app = test_app();
    upload_csv(&app, CSV).await;

    let response = app
        .clone()
        .oneshot(json_request("/api/data/describe", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["statistics"]["viability"]["count"], 4);

    let response = app
        .oneshot(json_request(
            "/api/data/plot",
            serde_json::json!({"plot_type": "bar", "x_column": "sample", "y_column": "viability"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["chart"]["plot_type"], "bar");
    assert_eq!(json["plot_type"], "bar");
}

#[tokio::test]
async fn document_upload_search_and_list() {
    let app = test_app();

    let (content_type, body) = multipart_file(
        "protocol.txt",
        "Western blot detects specific proteins using antibodies after gel electrophoresis.",
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/documents/upload")
        .header(header::CONTENT_TYPE, content_type)
        .body(body)
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let uploaded = body_json(response).await;
    assert_eq!(uploaded["filename"], "protocol.txt");
    assert_eq!(uploaded["num_chunks"], 1);

    let response = app
        .clone()
        .oneshot(json_request("/api/documents/search", serde_json::json!({"query": "antibodies"})))
        .await
        .unwrap();
    let json = body_json(response).await;
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["document"], "protocol.txt");
    assert!(results[0]["score"].as_f64().unwrap() > 0.0);

    let response = app
        .oneshot(Request::get("/api/documents/list").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["documents"][0]["name"], "protocol.txt");
    assert_eq!(json["documents"][0]["doc_id"], uploaded["doc_id"]);
}

#[tokio::test]
async fn empty_document_is_rejected() {
    let (content_type, body) = multipart_file("blank.txt", "   ");
    let request = Request::builder()
        .method("POST")
        .uri("/api/documents/upload")
        .header(header::CONTENT_TYPE, content_type)
        .body(body)
        .unwrap();
    let response = test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_chat_message_is_400() {
    let response = test_app()
        .oneshot(json_request("/api/chat/message", serde_json::json!({"message": "   "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["detail"], "Message cannot be empty.");
}

#[tokio::test]
async fn chat_history_starts_empty_and_clear_responds() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(Request::get("/api/chat/history").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["history"].as_array().unwrap().len(), 0);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat/clear")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "cleared");
}
