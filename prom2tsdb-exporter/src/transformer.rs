//! Conversion of Prometheus range-query results into OpenTSDB data points
//!
//! Each series' label set is turned into a tag set once:
//! 1. labels listed in the drop set are discarded
//! 2. renamed labels are emitted under their new key
//! 3. remaining labels are kept as they are
//! 4. configured tags are added last, overriding anything already present
//!
//! Keys and values are normalized at every step. The resulting tag set is
//! shared by all points of the series.

use prom2tsdb_core::{
    datapoint::DataPoint,
    error::{ExportError, ExportResult},
    matrix::{LabelSet, Matrix, QueryValue},
    tags::TagSet,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Label handling rules for one export
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformConfig {
    /// Metric name given to every output point
    pub metric_name: String,

    /// Label keys to discard
    pub drop: BTreeSet<String>,

    /// Original label key to replacement key
    pub rename: BTreeMap<String, String>,

    /// Tags added to every point after renaming
    pub add: BTreeMap<String, String>,
}

/// Turns query results into flat data point sequences
#[derive(Debug, Clone)]
pub struct Transformer {
    config: TransformConfig,
}

impl Transformer {
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Convert a query result. Only range matrices are supported; any other
    /// shape fails without producing points.
    pub fn transform(&self, value: QueryValue) -> ExportResult<Vec<DataPoint>> {
        match value {
            QueryValue::Matrix(matrix) => Ok(self.convert_matrix(&matrix)),
            other => Err(ExportError::UnsupportedResultType(other.value_type())),
        }
    }

    /// Flatten every series of a matrix, in series order then sample order
    pub fn convert_matrix(&self, matrix: &Matrix) -> Vec<DataPoint> {
        let total: usize = matrix.iter().map(|series| series.samples.len()).sum();
        debug!("{} measures from Prometheus", total);

        let mut points = Vec::with_capacity(total);
        for series in matrix {
            let tags = Arc::new(self.convert_tags(&series.labels));
            points.extend(series.samples.iter().map(|sample| {
                DataPoint::from_sample(&self.config.metric_name, sample, Arc::clone(&tags))
            }));
        }

        points
    }

    /// Compute the tag set of one series
    pub fn convert_tags(&self, labels: &LabelSet) -> TagSet {
        let mut tags = TagSet::new();

        for (key, value) in labels {
            if self.config.drop.contains(key) {
                continue;
            }
            match self.config.rename.get(key) {
                Some(new_key) => tags.insert_normalized(new_key, value),
                None => tags.insert_normalized(key, value),
            };
        }

        for (key, value) in &self.config.add {
            tags.insert_normalized(key, value);
        }

        tags
    }
}
