//! Prometheus client tests against a mock query API

mod common;

use axum::http::StatusCode;
use chrono::{TimeZone, Utc};
use common::{matrix_response, spawn_prometheus};
use prom2tsdb_core::{error::ExportError, matrix::QueryValue};
use prom2tsdb_exporter::prometheus::{PrometheusClient, QueryRange, RangeQuery};
use std::time::Duration;

fn range(step: Duration) -> QueryRange {
    QueryRange::new(
        Utc.with_ymd_and_hms(2019, 7, 31, 17, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2019, 7, 31, 18, 0, 0).unwrap(),
        step,
    )
    .unwrap()
}

#[tokio::test]
async fn test_query_range_matrix() {
    let (url, state) = spawn_prometheus(StatusCode::OK, &matrix_response()).await;
    let client = PrometheusClient::new(&url).unwrap();

    let response = client
        .query_range("up", &range(Duration::from_secs(60)))
        .await
        .unwrap();

    let QueryValue::Matrix(matrix) = response.value else {
        panic!("expected a matrix");
    };
    assert_eq!(matrix.len(), 2);
    assert_eq!(matrix[0].samples.len(), 2);
    assert_eq!(matrix[0].samples[1].timestamp_ms, 1564592460000);
    assert_eq!(matrix[0].samples[1].value, 0.5);
    assert_eq!(
        matrix[1].labels.get("instance").map(String::as_str),
        Some("node-2:9100")
    );
    assert!(response.warnings.is_empty());

    let params = state.params.lock();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0]["query"], "up");
    assert_eq!(params[0]["start"], "1564592400.000");
    assert_eq!(params[0]["end"], "1564596000.000");
    assert_eq!(params[0]["step"], "60");
}

#[tokio::test]
async fn test_query_range_fractional_step_and_warnings() {
    let body = r#"{
        "status": "success",
        "warnings": ["results truncated"],
        "data": {"resultType": "matrix", "result": []}
    }"#;
    let (url, state) = spawn_prometheus(StatusCode::OK, body).await;
    let client = PrometheusClient::new(&url).unwrap();

    let response = client
        .query_range("up", &range(Duration::from_millis(1500)))
        .await
        .unwrap();

    assert_eq!(response.value, QueryValue::Matrix(Vec::new()));
    assert_eq!(response.warnings, vec!["results truncated"]);
    assert_eq!(state.params.lock()[0]["step"], "1.5");
}

#[tokio::test]
async fn test_query_range_api_error() {
    let body = r#"{"status": "error", "errorType": "bad_data", "error": "parse error at char 3"}"#;
    let (url, _state) = spawn_prometheus(StatusCode::BAD_REQUEST, body).await;
    let client = PrometheusClient::new(&url).unwrap();

    let err = client
        .query_range("up{", &range(Duration::from_secs(60)))
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::Query(_)));
    let message = err.to_string();
    assert!(message.contains("bad_data"), "{}", message);
    assert!(message.contains("parse error at char 3"), "{}", message);
}

#[tokio::test]
async fn test_query_range_unparsable_response() {
    let (url, _state) = spawn_prometheus(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").await;
    let client = PrometheusClient::new(&url).unwrap();

    let err = client
        .query_range("up", &range(Duration::from_secs(60)))
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::Query(_)));
    assert!(err.to_string().contains("502"));
}

#[tokio::test]
async fn test_query_range_unreachable() {
    let client = PrometheusClient::new("http://127.0.0.1:9").unwrap();

    let err = client
        .query_range("up", &range(Duration::from_secs(60)))
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::Query(_)));
    assert_eq!(err.exit_code(), 2);
}
