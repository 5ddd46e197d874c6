//! Range-query result shapes returned by the query backend

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label set identifying a series
pub type LabelSet = BTreeMap<String, String>;

/// A single (timestamp, value) sample, timestamp in milliseconds since epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub value: f64,
}

/// One labeled time series with its ordered samples
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LabeledSeries {
    /// Series identity
    pub labels: LabelSet,

    /// Samples in backend order
    pub samples: Vec<Sample>,
}

/// A labeled series holding one sample, as returned by instant queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantSample {
    pub labels: LabelSet,
    pub sample: Sample,
}

/// Range-query result: one entry per series
pub type Matrix = Vec<LabeledSeries>;

/// Result shape discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Matrix,
    Vector,
    Scalar,
    String,
}

/// A query result in any of the shapes the backend can return
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Matrix(Matrix),
    Vector(Vec<InstantSample>),
    Scalar(Sample),
    String { timestamp_ms: i64, value: String },
}

impl Sample {
    pub fn new(timestamp_ms: i64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

impl LabeledSeries {
    /// Create a series from label pairs and samples
    pub fn new<I, K, V>(labels: I, samples: Vec<Sample>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            samples,
        }
    }

    /// Number of samples in the series
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl QueryValue {
    /// Shape of this result
    pub fn value_type(&self) -> ValueType {
        match self {
            QueryValue::Matrix(_) => ValueType::Matrix,
            QueryValue::Vector(_) => ValueType::Vector,
            QueryValue::Scalar(_) => ValueType::Scalar,
            QueryValue::String { .. } => ValueType::String,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Matrix => "matrix",
            ValueType::Vector => "vector",
            ValueType::Scalar => "scalar",
            ValueType::String => "string",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "matrix" => Ok(ValueType::Matrix),
            "vector" => Ok(ValueType::Vector),
            "scalar" => Ok(ValueType::Scalar),
            "string" => Ok(ValueType::String),
            other => Err(format!("unknown result type: {}", other)),
        }
    }
}
