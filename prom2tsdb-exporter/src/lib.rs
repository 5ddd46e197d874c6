//! prom2tsdb Exporter Library
//!
//! This library provides the components of the prom2tsdb exporter: loading
//! configuration, running a Prometheus range query, converting its result to
//! OpenTSDB data points and pushing them in concurrent bulks.

// Core modules
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod metrics;
pub mod pipeline;
pub mod prometheus;
pub mod transformer;

// Re-export commonly used types
pub use config::{ExporterConfig, QueryConfig};
pub use dispatcher::{BulkDispatcher, DeliveryFailure};
pub use pipeline::query_points;
pub use prometheus::{PrometheusClient, QueryRange, RangeQuery, RangeQueryResponse};
pub use transformer::{TransformConfig, Transformer};
