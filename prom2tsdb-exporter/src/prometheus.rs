//! Prometheus range-query client
//!
//! The exporter only needs one capability from the query backend: evaluate a
//! query over a time range at a fixed step and return the resulting series.
//! `RangeQuery` is that seam; `PrometheusClient` implements it over the
//! Prometheus HTTP API (`/api/v1/query_range`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prom2tsdb_core::{
    error::{ExportError, ExportResult},
    matrix::{InstantSample, LabelSet, LabeledSeries, QueryValue, Sample, ValueType},
};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Path of the range query endpoint
pub const QUERY_RANGE_PATH: &str = "/api/v1/query_range";

/// Time range and resolution of a range query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
}

impl QueryRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> ExportResult<Self> {
        if step.is_zero() {
            return Err(ExportError::configuration("query step must be greater than 0"));
        }
        if end < start {
            return Err(ExportError::configuration(format!(
                "end date ({}) is before start date ({})",
                end, start
            )));
        }
        Ok(Self { start, end, step })
    }
}

/// Result of a range query together with backend warnings
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQueryResponse {
    pub value: QueryValue,
    pub warnings: Vec<String>,
}

/// A backend able to evaluate range queries
#[async_trait]
pub trait RangeQuery: Send + Sync {
    async fn query_range(&self, query: &str, range: &QueryRange)
        -> ExportResult<RangeQueryResponse>;
}

/// Prometheus HTTP API client
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: reqwest::Client,
    query_range_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiData {
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiSeries {
    #[serde(default)]
    metric: LabelSet,
    #[serde(default)]
    values: Vec<ApiSamplePair>,
}

#[derive(Debug, Deserialize)]
struct ApiInstant {
    #[serde(default)]
    metric: LabelSet,
    value: ApiSamplePair,
}

/// `[<unix seconds as float>, "<value as string>"]`
#[derive(Debug, Deserialize)]
struct ApiSamplePair(f64, String);

impl ApiSamplePair {
    fn timestamp_ms(&self) -> i64 {
        (self.0 * 1000.0).round() as i64
    }

    fn to_sample(&self) -> ExportResult<Sample> {
        let value = self.1.parse::<f64>().map_err(|_| {
            ExportError::query(format!("invalid sample value '{}'", self.1))
        })?;
        Ok(Sample::new(self.timestamp_ms(), value))
    }
}

fn decode_result<T: serde::de::DeserializeOwned>(result: serde_json::Value) -> ExportResult<T> {
    serde_json::from_value(result)
        .map_err(|e| ExportError::query(format!("malformed query result: {}", e)))
}

fn decode_value(data: ApiData) -> ExportResult<QueryValue> {
    let result_type: ValueType = data
        .result_type
        .parse()
        .map_err(|e: String| ExportError::query(e))?;

    let value = match result_type {
        ValueType::Matrix => {
            let series: Vec<ApiSeries> = decode_result(data.result)?;
            let matrix = series
                .into_iter()
                .map(|s| {
                    let samples = s
                        .values
                        .iter()
                        .map(ApiSamplePair::to_sample)
                        .collect::<ExportResult<Vec<_>>>()?;
                    Ok(LabeledSeries {
                        labels: s.metric,
                        samples,
                    })
                })
                .collect::<ExportResult<Vec<_>>>()?;
            QueryValue::Matrix(matrix)
        }
        ValueType::Vector => {
            let instants: Vec<ApiInstant> = decode_result(data.result)?;
            let vector = instants
                .into_iter()
                .map(|i| {
                    Ok(InstantSample {
                        labels: i.metric,
                        sample: i.value.to_sample()?,
                    })
                })
                .collect::<ExportResult<Vec<_>>>()?;
            QueryValue::Vector(vector)
        }
        ValueType::Scalar => {
            let pair: ApiSamplePair = decode_result(data.result)?;
            QueryValue::Scalar(pair.to_sample()?)
        }
        ValueType::String => {
            let pair: ApiSamplePair = decode_result(data.result)?;
            QueryValue::String {
                timestamp_ms: pair.timestamp_ms(),
                value: pair.1,
            }
        }
    };

    Ok(value)
}

/// Unix seconds with millisecond precision, as the API expects
fn format_time(dt: &DateTime<Utc>) -> String {
    let millis = dt.timestamp_millis();
    format!("{}.{:03}", millis.div_euclid(1000), millis.rem_euclid(1000))
}

impl PrometheusClient {
    /// Create a client for the Prometheus server at `base_url`
    pub fn new(base_url: &str) -> ExportResult<Self> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            ExportError::query(format!(
                "error while initializing Prometheus http client API: {}",
                e
            ))
        })?;
        Ok(Self::with_client(base_url, client))
    }

    /// Create a client reusing an existing reqwest client
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            client,
            query_range_url: format!("{}{}", base_url.trim_end_matches('/'), QUERY_RANGE_PATH),
        }
    }

    pub fn query_range_url(&self) -> &str {
        &self.query_range_url
    }
}

#[async_trait]
impl RangeQuery for PrometheusClient {
    async fn query_range(
        &self,
        query: &str,
        range: &QueryRange,
    ) -> ExportResult<RangeQueryResponse> {
        let params = [
            ("query", query.to_string()),
            ("start", format_time(&range.start)),
            ("end", format_time(&range.end)),
            ("step", range.step.as_secs_f64().to_string()),
        ];
        debug!("Querying Prometheus: {} {:?}", self.query_range_url, params);

        let response = self
            .client
            .get(&self.query_range_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ExportError::query(format!("error while querying Prometheus: {}", e)))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            ExportError::query(format!("error while reading Prometheus response: {}", e))
        })?;

        let api: ApiResponse = serde_json::from_slice(&body).map_err(|e| {
            ExportError::query(format!(
                "unparsable Prometheus response (HTTP {}): {}",
                status, e
            ))
        })?;

        if api.status != "success" {
            return Err(ExportError::query(format!(
                "Prometheus query failed (HTTP {}): {}: {}",
                status,
                api.error_type.as_deref().unwrap_or("unknown"),
                api.error.as_deref().unwrap_or("no error message")
            )));
        }

        let data = api
            .data
            .ok_or_else(|| ExportError::query("Prometheus response has no data"))?;

        Ok(RangeQueryResponse {
            value: decode_value(data)?,
            warnings: api.warnings,
        })
    }
}
