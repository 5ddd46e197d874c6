//! OpenTSDB data point types

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::matrix::Sample;
use crate::tags::TagSet;

/// A single data point in OpenTSDB `/api/put` format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Metric name
    pub metric: String,

    /// Seconds since Unix epoch
    pub timestamp: u64,

    /// The measured value, narrowed to single precision
    pub value: f32,

    /// Tags, shared by every point of the same source series
    pub tags: Arc<TagSet>,
}

/// Summary returned by OpenTSDB when `summary` is requested on a put
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutSummary {
    #[serde(default)]
    pub failed: u64,

    #[serde(default)]
    pub success: u64,

    /// Per-point rejections, present when `details` is requested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<PutError>,
}

/// One rejected point in a detailed put summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutError {
    #[serde(default)]
    pub datapoint: serde_json::Value,

    #[serde(default)]
    pub error: String,
}

/// Convert a backend millisecond timestamp to epoch seconds.
///
/// The millisecond value is reinterpreted as unsigned before dividing, so a
/// negative timestamp wraps to a very large one instead of failing. This is
/// the same conversion as Go's `uint64(ts) / 1000`.
pub fn millis_to_secs(timestamp_ms: i64) -> u64 {
    (timestamp_ms as u64) / 1000
}

impl DataPoint {
    /// Create a data point
    pub fn new<M: Into<String>>(metric: M, timestamp: u64, value: f32, tags: Arc<TagSet>) -> Self {
        Self {
            metric: metric.into(),
            timestamp,
            value,
            tags,
        }
    }

    /// Build a data point from a backend sample
    pub fn from_sample(metric: &str, sample: &Sample, tags: Arc<TagSet>) -> Self {
        Self {
            metric: metric.to_string(),
            timestamp: millis_to_secs(sample.timestamp_ms),
            value: sample.value as f32,
            tags,
        }
    }
}

impl PutSummary {
    /// First reported rejection reason, if the server sent details
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(|e| e.error.as_str())
    }
}
