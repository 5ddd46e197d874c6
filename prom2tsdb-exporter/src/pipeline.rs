//! Query then transform: the part of an export run before delivery

use chrono::{DateTime, Utc};
use prom2tsdb_core::{
    datapoint::DataPoint,
    error::{ExportError, ExportResult},
    time::parse_duration,
};
use tracing::{debug, info, warn};

use crate::config::QueryConfig;
use crate::prometheus::{QueryRange, RangeQuery};
use crate::transformer::Transformer;

/// Run the configured range query on `backend` and convert its result to
/// data points.
///
/// The step is parsed before the backend is contacted, so a bad step is a
/// configuration error and no request is made.
pub async fn query_points(
    backend: &dyn RangeQuery,
    query: &QueryConfig,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ExportResult<Vec<DataPoint>> {
    let step = parse_duration(&query.step).map_err(|e| {
        ExportError::configuration(format!(
            "error while parsing step duration ({}): {}",
            query.step, e
        ))
    })?;
    let range = QueryRange::new(start, end, step)?;

    debug!(
        "Range query {} from {} to {} every {:?}",
        query.query, range.start, range.end, range.step
    );

    let response = backend
        .query_range(&query.query, &range)
        .await
        .map_err(|e| match e {
            ExportError::Query(_) => e,
            other => ExportError::query(format!("error while executing query: {}", other)),
        })?;

    for warning in &response.warnings {
        warn!("Prometheus warning: {}", warning);
    }

    let points = Transformer::new(query.transform_config()).transform(response.value)?;
    info!("{} data points to export as {}", points.len(), query.metric_name);
    Ok(points)
}
