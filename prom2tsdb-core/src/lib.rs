//! # prom2tsdb Core Library
//!
//! Shared data types and utilities for exporting Prometheus range queries
//! into OpenTSDB.
//!
//! ## Features
//!
//! - **Result shapes**: labeled series, samples and the query value variants
//! - **Data points**: the OpenTSDB `/api/put` wire type and put summaries
//! - **Tags**: tag sets and the character normalization OpenTSDB requires
//! - **Time**: duration and date parsing for configuration inputs
//! - **Errors**: the error taxonomy and the exit codes derived from it

pub mod datapoint;
pub mod error;
pub mod matrix;
pub mod tags;
pub mod time;

// Re-export commonly used types
pub use datapoint::{DataPoint, PutSummary};
pub use error::{ExportError, ExportResult};
pub use matrix::{LabelSet, LabeledSeries, Matrix, QueryValue, Sample, ValueType};
pub use tags::{normalize, TagSet};

/// Version information for prom2tsdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
