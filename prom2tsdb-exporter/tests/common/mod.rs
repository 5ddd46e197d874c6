//! In-process stand-ins for OpenTSDB and Prometheus

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{Query, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use prom2tsdb_core::{datapoint::DataPoint, tags::TagSet};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
    let addr = listener.local_addr().expect("mock server address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock server");
    });
    format!("http://{}", addr)
}

/// How the mock OpenTSDB answers `/api/put`
#[derive(Clone)]
pub struct TsdbBehavior {
    /// Status of the n-th request; requests past the end get `default_status`
    pub statuses: Vec<StatusCode>,
    pub default_status: StatusCode,
    pub body: String,
    pub delay: Duration,
}

impl Default for TsdbBehavior {
    fn default() -> Self {
        Self {
            statuses: Vec::new(),
            default_status: StatusCode::OK,
            body: String::new(),
            delay: Duration::ZERO,
        }
    }
}

impl TsdbBehavior {
    pub fn status(status: StatusCode, body: &str) -> Self {
        Self {
            default_status: status,
            body: body.to_string(),
            ..Default::default()
        }
    }
}

pub struct TsdbState {
    behavior: TsdbBehavior,
    pub requests: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub batches: Mutex<Vec<Vec<DataPoint>>>,
    pub queries: Mutex<Vec<Option<String>>>,
    pub content_types: Mutex<Vec<Option<String>>>,
}

impl TsdbState {
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Metric names of every received batch, sorted so that layouts can be
    /// compared regardless of which worker sent what first
    pub fn sorted_layout(&self) -> Vec<Vec<String>> {
        let mut layout: Vec<Vec<String>> = self
            .batches
            .lock()
            .iter()
            .map(|batch| batch.iter().map(|p| p.metric.clone()).collect())
            .collect();
        layout.sort();
        layout
    }
}

async fn put_handler(
    State(state): State<Arc<TsdbState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let n = state.requests.fetch_add(1, Ordering::SeqCst);
    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(current, Ordering::SeqCst);

    state.queries.lock().push(query);
    state.content_types.lock().push(
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
    state
        .batches
        .lock()
        .push(serde_json::from_slice(&body).unwrap_or_default());

    if !state.behavior.delay.is_zero() {
        tokio::time::sleep(state.behavior.delay).await;
    }
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    let status = state
        .behavior
        .statuses
        .get(n)
        .copied()
        .unwrap_or(state.behavior.default_status);
    (status, state.behavior.body.clone())
}

/// Start a mock OpenTSDB, returning its base URL and recorded state
pub async fn spawn_tsdb(behavior: TsdbBehavior) -> (String, Arc<TsdbState>) {
    let state = Arc::new(TsdbState {
        behavior,
        requests: AtomicUsize::new(0),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
        batches: Mutex::new(Vec::new()),
        queries: Mutex::new(Vec::new()),
        content_types: Mutex::new(Vec::new()),
    });
    let router = Router::new()
        .route("/api/put", post(put_handler))
        .with_state(Arc::clone(&state));
    (serve(router).await, state)
}

pub struct PromState {
    status: StatusCode,
    body: String,
    pub requests: AtomicUsize,
    pub params: Mutex<Vec<HashMap<String, String>>>,
}

impl PromState {
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

async fn query_range_handler(
    State(state): State<Arc<PromState>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state.params.lock().push(params);
    (
        state.status,
        [(header::CONTENT_TYPE, "application/json")],
        state.body.clone(),
    )
}

/// Start a mock Prometheus answering every range query with `body`
pub async fn spawn_prometheus(status: StatusCode, body: &str) -> (String, Arc<PromState>) {
    let state = Arc::new(PromState {
        status,
        body: body.to_string(),
        requests: AtomicUsize::new(0),
        params: Mutex::new(Vec::new()),
    });
    let router = Router::new()
        .route("/api/v1/query_range", get(query_range_handler))
        .with_state(Arc::clone(&state));
    (serve(router).await, state)
}

/// A successful range query answer with two series
pub fn matrix_response() -> String {
    serde_json::json!({
        "status": "success",
        "data": {
            "resultType": "matrix",
            "result": [
                {
                    "metric": {"__name__": "up", "instance": "node-1:9100", "job": "node"},
                    "values": [[1564592400, "1"], [1564592460, "0.5"]]
                },
                {
                    "metric": {"__name__": "up", "instance": "node-2:9100", "job": "node"},
                    "values": [[1564592400, "0"]]
                }
            ]
        }
    })
    .to_string()
}

/// `count` points named `m1`, `m2`, ... sharing one tag set
pub fn points(count: usize) -> Vec<DataPoint> {
    let tags = Arc::new(TagSet::from_iter([("host", "web01")]));
    (1..=count)
        .map(|i| DataPoint::new(format!("m{}", i), 1346846400 + i as u64, i as f32, Arc::clone(&tags)))
        .collect()
}

/// Write `contents` to a temporary file with the given suffix
pub fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}
