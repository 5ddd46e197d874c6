use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::path::Path;

use crate::transformer::TransformConfig;

const QUERY_CONF_DESC: &str = "query description";
const EXPORTER_CONF_DESC: &str = "exporter configuration";

/// Environment variables overriding exporter configuration fields
pub const ENV_PROMETHEUS_URL: &str = "PROM2TSDB_PROMETHEUS_URL";
pub const ENV_OPENTSDB_URL: &str = "PROM2TSDB_OPENTSDB_URL";
pub const ENV_BULK_SIZE: &str = "PROM2TSDB_BULK_SIZE";
pub const ENV_THREAD_COUNT: &str = "PROM2TSDB_THREAD_COUNT";
pub const ENV_PUSH_TIMEOUT: &str = "PROM2TSDB_PUSH_TIMEOUT";
pub const ENV_LOGGING_LEVEL: &str = "PROM2TSDB_LOGGING_LEVEL";

/// Description of the query to export and how its labels become tags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QueryConfig {
    /// Output metric name
    pub metric_name: String,

    /// PromQL expression to evaluate
    pub query: String,

    /// Resolution step of the range query
    pub step: String,

    /// Tags to add to (or override on) every point
    pub add_tags: BTreeMap<String, String>,

    /// Labels to drop
    pub remove_tags: Vec<String>,

    /// Labels to rename, original key to new key
    pub rename_tags: BTreeMap<String, String>,
}

/// Connection and delivery settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExporterConfig {
    /// Base URL of the Prometheus server
    pub prometheus_url: String,

    /// Base URL of the OpenTSDB server
    pub opentsdb_url: String,

    /// Points per HTTP request, 0 for the default
    pub bulk_size: usize,

    /// Concurrent pushers, 0 for the default
    pub thread_count: usize,

    /// Per-request timeout such as `30s`, empty for the default
    pub push_timeout: String,

    /// Log level, empty for `info`
    pub logging_level: String,
}

/// Read and deserialize a configuration file, YAML or JSON by extension
fn load_file<T: DeserializeOwned>(path: &str) -> Result<T> {
    if path.is_empty() {
        return Err(anyhow::anyhow!("No configuration file provided"));
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path))?;

    let is_yaml = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let config = if is_yaml {
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?
    } else {
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?
    };

    Ok(config)
}

fn check_not_empty(value: &str, field: &str, desc: &str) -> Result<()> {
    if value.is_empty() {
        return Err(anyhow::anyhow!("No {} provided in the {} file", field, desc));
    }
    Ok(())
}

impl QueryConfig {
    /// Load and validate a query description file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let config: Self = load_file(path)?;
        config
            .validate()
            .with_context(|| format!("Invalid {} file: {}", QUERY_CONF_DESC, path))?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        check_not_empty(&self.metric_name, "MetricName", QUERY_CONF_DESC)?;
        check_not_empty(&self.query, "Query", QUERY_CONF_DESC)?;
        check_not_empty(&self.step, "Step", QUERY_CONF_DESC)?;
        Ok(())
    }

    /// Label handling rules derived from this query
    pub fn transform_config(&self) -> TransformConfig {
        TransformConfig {
            metric_name: self.metric_name.clone(),
            drop: self.remove_tags.iter().cloned().collect::<BTreeSet<_>>(),
            rename: self.rename_tags.clone(),
            add: self.add_tags.clone(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from file, then environment variables, then validate
    pub fn load(path: &str) -> Result<Self> {
        let mut config: Self = load_file(path)?;
        config.apply_overrides(|key| env::var(key).ok())?;
        config
            .validate()
            .with_context(|| format!("Invalid {} file: {}", EXPORTER_CONF_DESC, path))?;
        Ok(config)
    }

    /// Override fields from a variable lookup such as the process environment
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_PROMETHEUS_URL) {
            self.prometheus_url = url;
        }

        if let Some(url) = lookup(ENV_OPENTSDB_URL) {
            self.opentsdb_url = url;
        }

        if let Some(bulk_size) = lookup(ENV_BULK_SIZE) {
            self.bulk_size = bulk_size
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_BULK_SIZE, bulk_size))?;
        }

        if let Some(thread_count) = lookup(ENV_THREAD_COUNT) {
            self.thread_count = thread_count
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_THREAD_COUNT, thread_count))?;
        }

        if let Some(timeout) = lookup(ENV_PUSH_TIMEOUT) {
            self.push_timeout = timeout;
        }

        if let Some(level) = lookup(ENV_LOGGING_LEVEL) {
            self.logging_level = level;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        check_not_empty(&self.prometheus_url, "PrometheusUrl", EXPORTER_CONF_DESC)?;
        check_not_empty(&self.opentsdb_url, "OpentsdbUrl", EXPORTER_CONF_DESC)?;
        Ok(())
    }
}
