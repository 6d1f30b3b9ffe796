/// Batching write cache in front of the cluster
///
/// Producers enqueue records with a cheap, non-blocking `record()`; a
/// throttled `flush()` drains the queue, writes any dimension rows not yet
/// known to storage over a direct coordinator connection, then writes all
/// fact rows over a single pooled connection. Rows drained for a failed
/// flush are dropped, not retried: availability is preferred over
/// durability on this path.
pub mod classifier;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::cluster::directory::NodeDirectory;
use crate::error::{SinkError, SinkResult};
use crate::pool::ConnectionPool;
use crate::sql::{ClientConnection, Connector, SqlValue};
use classifier::CLASSIFIER_COLUMNS;

/// Batching and throttling knobs
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Flush calls inside this window after a flush starts are coalesced
    pub flush_throttle: Duration,
    /// Dimension rows per INSERT statement
    pub dimension_batch: usize,
    /// Fact rows per INSERT statement
    pub fact_batch: usize,
    /// Period of the seen-classifier cache reset
    pub seen_reset_interval: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            flush_throttle: Duration::from_secs(1),
            dimension_batch: 64,
            fact_batch: 128,
            seen_reset_interval: Duration::from_secs(300),
        }
    }
}

/// One queued observation with its derived dimension row
#[derive(Debug, Clone)]
struct PendingRow {
    classifier_id: u64,
    key: String,
    classifiers: Vec<String>,
    value: f64,
    created: String,
}

impl PendingRow {
    fn new(key: &str, value: f64, timestamp: i64) -> Self {
        let derived = classifier::derive(key);
        Self {
            classifier_id: derived.id,
            key: key.to_string(),
            classifiers: derived.classifiers,
            value,
            created: iso_timestamp(timestamp),
        }
    }
}

/// What a flush call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The flush body ran and wrote this many fact rows
    Flushed(usize),
    /// The call was absorbed by an in-flight or recent flush
    Coalesced,
}

/// Coordinates the single-flight flush state
struct FlushGate {
    in_flight: bool,
    trailing: bool,
    last_started: Option<Instant>,
}

pub struct WriteBatcher<C: Connector> {
    database: String,
    pool: Arc<ConnectionPool<C>>,
    directory: Arc<NodeDirectory<C>>,
    config: BatcherConfig,
    queue: mpsc::UnboundedSender<PendingRow>,
    pending: Mutex<mpsc::UnboundedReceiver<PendingRow>>,
    /// Classifier ids known to exist in storage, kept numerically sorted
    seen: Mutex<Vec<u64>>,
    gate: Mutex<FlushGate>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: Connector> WriteBatcher<C> {
    /// Create the batcher and start its periodic seen-cache reset task.
    pub async fn start(
        database: String,
        pool: Arc<ConnectionPool<C>>,
        directory: Arc<NodeDirectory<C>>,
        config: BatcherConfig,
    ) -> Arc<Self> {
        let (queue, receiver) = mpsc::unbounded_channel();
        let batcher = Arc::new(Self {
            database,
            pool,
            directory,
            config,
            queue,
            pending: Mutex::new(receiver),
            seen: Mutex::new(Vec::new()),
            gate: Mutex::new(FlushGate {
                in_flight: false,
                trailing: false,
                last_started: None,
            }),
            tasks: Mutex::new(Vec::new()),
        });

        let reset = {
            let batcher = Arc::clone(&batcher);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(batcher.config.seen_reset_interval);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    batcher.reset_seen().await;
                }
            })
        };
        batcher.tasks.lock().await.push(reset);
        batcher
    }

    /// Enqueue one observation. Never blocks and never touches storage.
    pub fn record(&self, key: &str, value: f64, timestamp: i64) {
        let row = PendingRow::new(key, value, timestamp);
        if self.queue.send(row).is_err() {
            log::debug!("batcher queue closed; dropping record for {key}");
        }
    }

    /// Drain the pending queue and write it out.
    ///
    /// Calls while a flush is in flight mark a single trailing re-run; calls
    /// inside the throttle window after a flush started are absorbed
    /// entirely. Dimension inserts complete before fact inserts begin.
    pub async fn flush(&self) -> SinkResult<FlushOutcome> {
        {
            let mut gate = self.gate.lock().await;
            if gate.in_flight {
                gate.trailing = true;
                return Ok(FlushOutcome::Coalesced);
            }
            if let Some(last) = gate.last_started {
                if last.elapsed() < self.config.flush_throttle {
                    return Ok(FlushOutcome::Coalesced);
                }
            }
            gate.in_flight = true;
            gate.last_started = Some(Instant::now());
        }

        let mut flushed = 0;
        loop {
            match self.run_flush().await {
                Ok(count) => {
                    flushed += count;
                    let mut gate = self.gate.lock().await;
                    if gate.trailing {
                        gate.trailing = false;
                        gate.last_started = Some(Instant::now());
                        continue;
                    }
                    gate.in_flight = false;
                    return Ok(FlushOutcome::Flushed(flushed));
                }
                Err(e) => {
                    let mut gate = self.gate.lock().await;
                    gate.in_flight = false;
                    gate.trailing = false;
                    return Err(e);
                }
            }
        }
    }

    /// Clear the seen-classifier cache, making every classifier eligible for
    /// a dimension re-insert on its next occurrence.
    pub async fn reset_seen(&self) {
        let mut seen = self.seen.lock().await;
        if !seen.is_empty() {
            log::debug!("clearing {} cached classifier ids", seen.len());
        }
        seen.clear();
    }

    /// Stop the periodic reset task.
    pub async fn close(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
    }

    async fn run_flush(&self) -> SinkResult<usize> {
        let rows = self.drain_pending().await;
        if rows.is_empty() {
            return Ok(0);
        }

        let fresh = self.mark_unseen(&rows).await;
        if !fresh.is_empty() {
            self.write_dimensions(&fresh).await;
        }
        self.write_facts(&rows).await?;
        Ok(rows.len())
    }

    async fn drain_pending(&self) -> Vec<PendingRow> {
        let mut receiver = self.pending.lock().await;
        let mut rows = Vec::new();
        while let Ok(row) = receiver.try_recv() {
            rows.push(row);
        }
        rows
    }

    /// Partition out the rows whose classifier id is not yet known to
    /// storage, marking each as seen as it is found. A later insert failure
    /// does not un-mark them; the periodic reset is the recovery path.
    async fn mark_unseen<'a>(&self, rows: &'a [PendingRow]) -> Vec<&'a PendingRow> {
        let mut seen = self.seen.lock().await;
        let mut fresh = Vec::new();
        for row in rows {
            if let Err(insert_at) = seen.binary_search(&row.classifier_id) {
                seen.insert(insert_at, row.classifier_id);
                fresh.push(row);
            }
        }
        fresh
    }

    /// Best-effort dimension inserts over a direct coordinator connection,
    /// kept off the pool so a slow dimension write cannot starve fact
    /// writes. Failures are logged and the flush carries on: the upsert is a
    /// no-op on key collision, so the rows land on a later epoch.
    async fn write_dimensions(&self, fresh: &[&PendingRow]) {
        let mut conn = match self.directory.connect_coordinator().await {
            Ok(conn) => conn,
            Err(e) => {
                log::debug!("skipping {} dimension rows: {e}", fresh.len());
                return;
            }
        };

        for chunk in fresh.chunks(self.config.dimension_batch) {
            let (statement, params) = self.dimension_statement(chunk);
            if let Err(e) = conn.exec(&statement, &params).await {
                log::debug!("dimension insert failed: {e}");
                return;
            }
        }
        let _ = conn.disconnect().await;
    }

    /// Write every fact row of this flush over one pooled connection, in
    /// batch order. The connection is destroyed on failure so a broken
    /// stream never returns to the pool.
    async fn write_facts(&self, rows: &[PendingRow]) -> SinkResult<()> {
        let series: Vec<(String, Vec<SqlValue>)> = rows
            .chunks(self.config.fact_batch)
            .map(|chunk| self.fact_statement(chunk))
            .collect();

        let mut pooled = self.pool.acquire().await?;
        match pooled.conn_mut().exec_series(&series).await {
            Ok(_) => {
                self.pool.release(pooled).await;
                Ok(())
            }
            Err(e) => {
                self.pool.destroy(pooled).await;
                Err(SinkError::write(format!("fact insert failed: {e}")))
            }
        }
    }

    fn dimension_statement(&self, rows: &[&PendingRow]) -> (String, Vec<SqlValue>) {
        let mut columns = vec!["id", "classifier"];
        columns.extend(CLASSIFIER_COLUMNS);
        let statement = format!(
            "INSERT IGNORE INTO `{}`.classifiers ({}) VALUES {}",
            self.database,
            columns.join(","),
            placeholders(columns.len(), rows.len())
        );

        let mut params = Vec::with_capacity(rows.len() * columns.len());
        for row in rows {
            params.push(SqlValue::UInt(row.classifier_id));
            params.push(SqlValue::Text(row.key.clone()));
            params.extend(row.classifiers.iter().cloned().map(SqlValue::Text));
        }
        (statement, params)
    }

    fn fact_statement(&self, rows: &[PendingRow]) -> (String, Vec<SqlValue>) {
        let statement = format!(
            "INSERT INTO `{}`.analytics (classifier_id,value,created) VALUES {}",
            self.database,
            placeholders(3, rows.len())
        );

        let mut params = Vec::with_capacity(rows.len() * 3);
        for row in rows {
            params.push(SqlValue::UInt(row.classifier_id));
            params.push(SqlValue::Float(row.value));
            params.push(SqlValue::Text(row.created.clone()));
        }
        (statement, params)
    }
}

fn placeholders(columns: usize, rows: usize) -> String {
    let row = format!("({})", vec!["?"; columns].join(","));
    vec![row; rows].join(",")
}

fn iso_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
