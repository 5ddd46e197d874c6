//! Bulk Dispatcher for OpenTSDB
//!
//! Data points are cut into fixed-size batches by a single producer and
//! pushed by a fixed pool of worker tasks reading from a bounded Flume
//! channel (capacity = worker count). `push` returns only once every worker
//! has drained the channel and finished its in-flight request.
//!
//! Each batch gets exactly one HTTP attempt. A failed batch is logged and
//! flagged but does not stop the other batches; the caller only learns
//! whether at least one batch failed.

use flume::Receiver;
use prom2tsdb_core::{
    datapoint::{DataPoint, PutSummary},
    error::{ExportError, ExportResult},
    time::parse_duration,
};
use reqwest::{header::CONTENT_TYPE, StatusCode};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::config::ExporterConfig;
use crate::metrics::DispatchMetrics;

/// Path and query appended to the OpenTSDB base URL
pub const OPENTSDB_PUT_SUFFIX: &str = "/api/put?summary&details";

pub const DEFAULT_BULK_SIZE: usize = 50;
pub const DEFAULT_THREAD_COUNT: usize = 1;
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(60);

/// Why a single batch was not accepted
#[derive(Error, Debug)]
pub enum DeliveryFailure {
    #[error("error while marshaling data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("error while pushing data: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("error while reading response (HTTP {status}): {source}")]
    ReadBody {
        status: StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("error while parsing response (HTTP {status}): {source}")]
    UnparsableResponse {
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },

    #[error("some metrics have been rejected ({failed} failed, {success} succeeded, HTTP {status})")]
    Rejected {
        status: StatusCode,
        failed: u64,
        success: u64,
    },
}

/// A contiguous slice of the point sequence, the unit of one delivery attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Position of this batch in the sequence
    pub index: usize,

    /// 1-based position of the first point, for logging
    pub first_point: usize,

    pub points: Vec<DataPoint>,
}

/// Splits a point sequence into consecutive batches, moving the points
#[derive(Debug)]
pub struct Batches {
    points: std::vec::IntoIter<DataPoint>,
    bulk_size: usize,
    next_index: usize,
    consumed: usize,
}

impl Batches {
    pub fn new(points: Vec<DataPoint>, bulk_size: usize) -> Self {
        Self {
            points: points.into_iter(),
            bulk_size: bulk_size.max(1),
            next_index: 0,
            consumed: 0,
        }
    }
}

impl Iterator for Batches {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let points: Vec<DataPoint> = self.points.by_ref().take(self.bulk_size).collect();
        if points.is_empty() {
            return None;
        }

        let batch = Batch {
            index: self.next_index,
            first_point: self.consumed + 1,
            points,
        };
        self.next_index += 1;
        self.consumed += batch.points.len();
        Some(batch)
    }
}

/// State shared by all worker tasks
#[derive(Debug)]
struct Pusher {
    client: reqwest::Client,
    put_url: String,
    metrics: DispatchMetrics,
}

impl Pusher {
    /// Push one batch and record the outcome
    async fn do_push(
        &self,
        worker_id: usize,
        batch_index: usize,
        points: &[DataPoint],
    ) -> Result<usize, DeliveryFailure> {
        let start = Instant::now();
        let result = self.send(worker_id, batch_index, points).await;

        match &result {
            Ok(count) => self.metrics.record_success(*count, start.elapsed()),
            Err(_) => self.metrics.record_failure(start.elapsed()),
        }
        result
    }

    async fn send(
        &self,
        worker_id: usize,
        batch_index: usize,
        points: &[DataPoint],
    ) -> Result<usize, DeliveryFailure> {
        let body = serde_json::to_vec(points)?;

        let response = self
            .client
            .post(&self.put_url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(DeliveryFailure::Transport)?;

        let status = response.status();
        if status == StatusCode::OK {
            debug!(
                "pusher {}, batch {}: pushed {} points with success",
                worker_id,
                batch_index,
                points.len()
            );
            return Ok(points.len());
        }

        warn!(
            "pusher {}, batch {}: OpenTSDB HTTP status {}",
            worker_id, batch_index, status
        );
        let content = response
            .bytes()
            .await
            .map_err(|source| DeliveryFailure::ReadBody { status, source })?;
        warn!(
            "pusher {}, batch {}: OpenTSDB response: {}",
            worker_id,
            batch_index,
            String::from_utf8_lossy(&content)
        );

        let summary: PutSummary = serde_json::from_slice(&content)
            .map_err(|source| DeliveryFailure::UnparsableResponse { status, source })?;
        if let Some(reason) = summary.first_error() {
            warn!(
                "pusher {}, batch {}: first rejection reason: {}",
                worker_id, batch_index, reason
            );
        }
        warn!(
            "pusher {}, batch {}: OpenTSDB rejected metrics: {}",
            worker_id, batch_index, summary.failed
        );

        Err(DeliveryFailure::Rejected {
            status,
            failed: summary.failed,
            success: summary.success,
        })
    }
}

/// Concurrent, batched delivery of data points to OpenTSDB
#[derive(Debug, Clone)]
pub struct BulkDispatcher {
    pusher: Arc<Pusher>,
    bulk_size: usize,
    thread_count: usize,
    push_timeout: Duration,
}

impl BulkDispatcher {
    /// Build a dispatcher from the exporter configuration, applying defaults
    /// for unset values. An unparsable push timeout fails here, before any
    /// push is attempted.
    pub fn new(config: &ExporterConfig) -> ExportResult<Self> {
        let bulk_size = if config.bulk_size == 0 {
            info!("Default bulk size will be used: {}", DEFAULT_BULK_SIZE);
            DEFAULT_BULK_SIZE
        } else {
            config.bulk_size
        };

        let thread_count = if config.thread_count == 0 {
            info!("Default thread count will be used: {}", DEFAULT_THREAD_COUNT);
            DEFAULT_THREAD_COUNT
        } else {
            config.thread_count
        };

        let push_timeout = match config.push_timeout.as_str() {
            "" => {
                info!("Default push timeout will be used: {:?}", DEFAULT_PUSH_TIMEOUT);
                DEFAULT_PUSH_TIMEOUT
            }
            raw => {
                let parsed = parse_duration(raw).map_err(|e| {
                    ExportError::configuration(format!(
                        "error while parsing push timeout duration ({}): {}",
                        raw, e
                    ))
                })?;
                if parsed.is_zero() {
                    info!("Default push timeout will be used: {:?}", DEFAULT_PUSH_TIMEOUT);
                    DEFAULT_PUSH_TIMEOUT
                } else {
                    parsed
                }
            }
        };

        Self::with_settings(&config.opentsdb_url, bulk_size, thread_count, push_timeout)
    }

    /// Build a dispatcher from explicit, already validated settings
    pub fn with_settings(
        opentsdb_url: &str,
        bulk_size: usize,
        thread_count: usize,
        push_timeout: Duration,
    ) -> ExportResult<Self> {
        if bulk_size == 0 || thread_count == 0 {
            return Err(ExportError::configuration(
                "bulk size and thread count must be greater than 0",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(push_timeout)
            .build()
            .map_err(|e| {
                ExportError::configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        let metrics = DispatchMetrics::new().map_err(|e| {
            ExportError::configuration(format!("Failed to register dispatch metrics: {}", e))
        })?;

        let put_url = format!(
            "{}{}",
            opentsdb_url.trim_end_matches('/'),
            OPENTSDB_PUT_SUFFIX
        );

        Ok(Self {
            pusher: Arc::new(Pusher {
                client,
                put_url,
                metrics,
            }),
            bulk_size,
            thread_count,
            push_timeout,
        })
    }

    pub fn bulk_size(&self) -> usize {
        self.bulk_size
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn push_timeout(&self) -> Duration {
        self.push_timeout
    }

    /// Full URL batches are posted to
    pub fn put_url(&self) -> &str {
        &self.pusher.put_url
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.pusher.metrics
    }

    /// Push every point, blocking until all batches have been attempted.
    ///
    /// Fails if at least one batch was not accepted.
    pub async fn push(&self, points: Vec<DataPoint>) -> ExportResult<()> {
        let total = points.len();
        if total == 0 {
            debug!("Nothing to push");
            return Ok(());
        }

        let (tasks_tx, tasks_rx) = flume::bounded::<Batch>(self.thread_count);
        let failed = Arc::new(AtomicBool::new(false));

        // consumers
        let workers: Vec<_> = (0..self.thread_count)
            .map(|worker_id| {
                Self::spawn_worker(
                    worker_id,
                    tasks_rx.clone(),
                    Arc::clone(&self.pusher),
                    Arc::clone(&failed),
                )
            })
            .collect();
        drop(tasks_rx);

        // producer
        let mut batch_count = 0;
        for batch in Batches::new(points, self.bulk_size) {
            debug!(
                "new task, {} to {}, total: {}",
                batch.first_point,
                batch.first_point + batch.points.len() - 1,
                total
            );
            let index = batch.index;
            if tasks_tx.send_async(batch).await.is_err() {
                error!("All pushers stopped before batch {} could be queued", index);
                failed.store(true, Ordering::Relaxed);
                break;
            }
            batch_count += 1;
        }
        drop(tasks_tx);

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Pusher task ended abnormally: {}", e);
                failed.store(true, Ordering::Relaxed);
            }
        }

        let snapshot = self.metrics().snapshot();
        info!(
            "Push finished: {} points in {} batches ({} batches failed overall, {} points accepted overall)",
            total, batch_count, snapshot.batches_failed_total, snapshot.points_sent_total
        );
        debug!("Dispatch metrics:\n{}", self.metrics().gather_text());

        if failed.load(Ordering::Relaxed) {
            return Err(ExportError::delivery(
                "Some errors occurred while pushing to OpenTSDB",
            ));
        }
        Ok(())
    }

    /// Push a single batch without going through the worker pool
    pub async fn do_push(&self, points: &[DataPoint]) -> Result<usize, DeliveryFailure> {
        self.pusher.do_push(0, 0, points).await
    }

    /// Spawn a worker that pushes batches until the channel is closed and empty
    fn spawn_worker(
        worker_id: usize,
        tasks_rx: Receiver<Batch>,
        pusher: Arc<Pusher>,
        failed: Arc<AtomicBool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Ok(batch) = tasks_rx.recv_async().await {
                trace!(
                    "pusher {}, batch {} of {} points",
                    worker_id,
                    batch.index,
                    batch.points.len()
                );

                if let Err(e) = pusher.do_push(worker_id, batch.index, &batch.points).await {
                    failed.store(true, Ordering::Relaxed);
                    error!(
                        "pusher {}, error while pushing batch {} to OpenTSDB: {}",
                        worker_id, batch.index, e
                    );
                }
            }

            trace!("pusher {} shutting down", worker_id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prom2tsdb_core::tags::TagSet;

    fn points(count: usize) -> Vec<DataPoint> {
        let tags = Arc::new(TagSet::new());
        (0..count)
            .map(|i| DataPoint::new(format!("m{}", i + 1), 42 + i as u64, 1.3, Arc::clone(&tags)))
            .collect()
    }

    fn batch_layout(count: usize, bulk_size: usize) -> Vec<Vec<String>> {
        Batches::new(points(count), bulk_size)
            .map(|batch| batch.points.into_iter().map(|p| p.metric).collect())
            .collect()
    }

    #[test]
    fn test_batches_partition_in_order() {
        assert_eq!(
            batch_layout(4, 1),
            vec![vec!["m1"], vec!["m2"], vec!["m3"], vec!["m4"]]
        );
        assert_eq!(batch_layout(4, 2), vec![vec!["m1", "m2"], vec!["m3", "m4"]]);
        assert_eq!(batch_layout(4, 3), vec![vec!["m1", "m2", "m3"], vec!["m4"]]);
        assert_eq!(batch_layout(4, 4), vec![vec!["m1", "m2", "m3", "m4"]]);
        assert_eq!(batch_layout(4, 5), vec![vec!["m1", "m2", "m3", "m4"]]);
    }

    #[test]
    fn test_batches_metadata() {
        let batches: Vec<Batch> = Batches::new(points(7), 3).collect();
        let meta: Vec<(usize, usize, usize)> = batches
            .iter()
            .map(|b| (b.index, b.first_point, b.points.len()))
            .collect();
        assert_eq!(meta, vec![(0, 1, 3), (1, 4, 3), (2, 7, 1)]);
    }

    #[test]
    fn test_no_points_no_batches() {
        assert_eq!(Batches::new(Vec::new(), 50).count(), 0);
    }

    #[test]
    fn test_default_values() {
        let dispatcher = BulkDispatcher::new(&ExporterConfig::default()).unwrap();
        assert_eq!(dispatcher.bulk_size(), DEFAULT_BULK_SIZE);
        assert_eq!(dispatcher.thread_count(), DEFAULT_THREAD_COUNT);
        assert_eq!(dispatcher.push_timeout(), DEFAULT_PUSH_TIMEOUT);
        assert_eq!(dispatcher.bulk_size(), 50);
        assert_eq!(dispatcher.thread_count(), 1);
        assert_eq!(dispatcher.push_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_explicit_values() {
        let config = ExporterConfig {
            opentsdb_url: "http://tsdb:4242/".to_string(),
            bulk_size: 10,
            thread_count: 4,
            push_timeout: "1m30s".to_string(),
            ..Default::default()
        };
        let dispatcher = BulkDispatcher::new(&config).unwrap();

        assert_eq!(dispatcher.bulk_size(), 10);
        assert_eq!(dispatcher.thread_count(), 4);
        assert_eq!(dispatcher.push_timeout(), Duration::from_secs(90));
        assert_eq!(dispatcher.put_url(), "http://tsdb:4242/api/put?summary&details");
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let config = ExporterConfig {
            push_timeout: "0s".to_string(),
            ..Default::default()
        };
        let dispatcher = BulkDispatcher::new(&config).unwrap();
        assert_eq!(dispatcher.push_timeout(), DEFAULT_PUSH_TIMEOUT);
    }

    #[test]
    fn test_unparsable_timeout() {
        let config = ExporterConfig {
            push_timeout: "blabla".to_string(),
            ..Default::default()
        };
        match BulkDispatcher::new(&config) {
            Err(ExportError::Configuration(message)) => assert!(message.contains("blabla")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_with_settings_rejects_zero() {
        assert!(BulkDispatcher::with_settings("http://x", 0, 1, DEFAULT_PUSH_TIMEOUT).is_err());
        assert!(BulkDispatcher::with_settings("http://x", 1, 0, DEFAULT_PUSH_TIMEOUT).is_err());
    }

    #[tokio::test]
    async fn test_push_nothing_succeeds_without_requests() {
        // Nothing listens on this port; any request would fail the push
        let dispatcher =
            BulkDispatcher::with_settings("http://127.0.0.1:9", 1, 2, Duration::from_secs(1))
                .unwrap();

        dispatcher.push(Vec::new()).await.unwrap();
        assert_eq!(dispatcher.metrics().snapshot().batches_total, 0);
    }

    #[tokio::test]
    async fn test_transport_failure_fails_push() {
        let dispatcher =
            BulkDispatcher::with_settings("http://127.0.0.1:9", 2, 2, Duration::from_secs(2))
                .unwrap();

        let result = dispatcher.push(points(3)).await;
        assert!(matches!(result, Err(ExportError::Delivery(_))));

        let snapshot = dispatcher.metrics().snapshot();
        assert_eq!(snapshot.batches_total, 2);
        assert_eq!(snapshot.batches_failed_total, 2);

        let text = dispatcher.metrics().gather_text();
        assert!(text.contains("prom2tsdb_batches_failed_total 2"));
        assert!(text.contains("prom2tsdb_points_sent_total 0"));
    }
}
