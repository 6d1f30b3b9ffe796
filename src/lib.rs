//! statsink: resilient batched write path from a metrics collector into a
//! distributed, horizontally-scaled SQL cluster.
//!
//! The cluster's writable nodes are discovered through a well-known
//! coordinator and tracked by a [`cluster::directory::NodeDirectory`]. A
//! bounded [`pool::ConnectionPool`] keeps live connections to those nodes,
//! failing over by random re-selection when nodes disappear. Incoming
//! time-series records are buffered by a [`batcher::WriteBatcher`] and
//! flushed in batches, with recurring dimension rows deduplicated by a
//! content-addressed classifier id so each is written at most once per cache
//! epoch.
pub mod batcher;
pub mod cluster;
pub mod config;
pub mod error;
pub mod ingest;
pub mod pool;
pub mod sql;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::batcher::{FlushOutcome, WriteBatcher};
use crate::cluster::directory::NodeDirectory;
use crate::config::Config;
use crate::error::SinkResult;
use crate::ingest::MetricsSnapshot;
use crate::pool::ConnectionPool;
use crate::sql::mysql::MySqlConnector;
use crate::sql::Connector;

/// Running status counters, readable at any time without locking
#[derive(Debug)]
pub struct SinkStats {
    exception_count: AtomicU64,
    flush_time_ms: AtomicI64,
    flush_length: AtomicU64,
}

impl Default for SinkStats {
    fn default() -> Self {
        Self {
            exception_count: AtomicU64::new(0),
            // -1 until the first successful flush
            flush_time_ms: AtomicI64::new(-1),
            flush_length: AtomicU64::new(0),
        }
    }
}

impl SinkStats {
    fn record_flush(&self, elapsed_ms: i64, rows: u64) {
        self.flush_time_ms.store(elapsed_ms, Ordering::Relaxed);
        self.flush_length.store(rows, Ordering::Relaxed);
    }

    fn record_exception(&self) {
        self.exception_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            exception_count: self.exception_count.load(Ordering::Relaxed),
            flush_time_ms: self.flush_time_ms.load(Ordering::Relaxed),
            flush_length: self.flush_length.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the sink's status counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Failed flush cycles since startup
    pub exception_count: u64,
    /// Duration of the last successful flush, -1 before the first
    pub flush_time_ms: i64,
    /// Fact rows written by the last successful flush
    pub flush_length: u64,
}

/// The assembled write path: directory, pool, batcher and status counters
pub struct StatSink<C: Connector> {
    directory: Arc<NodeDirectory<C>>,
    pool: Arc<ConnectionPool<C>>,
    batcher: Arc<WriteBatcher<C>>,
    stats: SinkStats,
}

impl StatSink<MySqlConnector> {
    /// Assemble a sink speaking the MySQL wire protocol to the configured
    /// cluster.
    pub async fn connect(config: &Config) -> SinkResult<Arc<Self>> {
        Self::with_connector(config, MySqlConnector::new()).await
    }
}

impl<C: Connector> StatSink<C> {
    /// Assemble a sink over an arbitrary transport.
    pub async fn with_connector(config: &Config, connector: C) -> SinkResult<Arc<Self>> {
        config.validate()?;

        let directory = Arc::new(NodeDirectory::new(connector, config.coordinator()));
        let pool = ConnectionPool::start(Arc::clone(&directory), config.pool_config()).await;
        let batcher = WriteBatcher::start(
            config.cluster.database.clone(),
            Arc::clone(&pool),
            Arc::clone(&directory),
            config.batcher_config(),
        )
        .await;

        Ok(Arc::new(Self {
            directory,
            pool,
            batcher,
            stats: SinkStats::default(),
        }))
    }

    /// Fire-and-forget ingestion of one observation.
    pub fn record(&self, key: &str, value: f64, timestamp: i64) {
        self.batcher.record(key, value, timestamp);
    }

    /// Trigger a throttled write cycle and account for its outcome.
    pub async fn flush(&self) -> SinkResult<FlushOutcome> {
        let started = Instant::now();
        match self.batcher.flush().await {
            Ok(FlushOutcome::Flushed(rows)) => {
                let elapsed = started.elapsed().as_millis() as i64;
                self.stats.record_flush(elapsed, rows as u64);
                log::debug!("flushed {rows} fact rows in {elapsed}ms");
                Ok(FlushOutcome::Flushed(rows))
            }
            Ok(FlushOutcome::Coalesced) => Ok(FlushOutcome::Coalesced),
            Err(e) => {
                self.stats.record_exception();
                log::info!("flush failed: {e}");
                Err(e)
            }
        }
    }

    /// Expand an upstream metrics snapshot into records, including the
    /// sink's own status counters, and flush.
    pub async fn flush_metrics(
        &self,
        timestamp: i64,
        snapshot: &MetricsSnapshot,
    ) -> SinkResult<FlushOutcome> {
        ingest::each_record(snapshot, |key, value| {
            self.batcher.record(&key, value, timestamp)
        });

        let status = self.stats.snapshot();
        if status.exception_count > 0 {
            self.record(
                "statsink.exception_count",
                status.exception_count as f64,
                timestamp,
            );
        }
        if status.flush_time_ms >= 0 {
            self.record("statsink.flush_time", status.flush_time_ms as f64, timestamp);
        }
        if status.flush_length > 0 {
            self.record("statsink.flush_length", status.flush_length as f64, timestamp);
        }

        self.flush().await
    }

    /// Read-only snapshot of the status counters.
    pub fn status(&self) -> StatusSnapshot {
        self.stats.snapshot()
    }

    /// The node directory backing this sink.
    pub fn directory(&self) -> &Arc<NodeDirectory<C>> {
        &self.directory
    }

    /// Graceful shutdown: stop timers and drain the pool.
    pub async fn close(&self) {
        self.batcher.close().await;
        self.pool.close().await;
    }
}
