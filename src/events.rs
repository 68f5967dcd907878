//! Buffered lifecycle event writer.
//!
//! Events are fired from hot paths (claims, results, stall recovery), so
//! emission must never block on the database. `EventWriter` pushes rows
//! into a bounded channel; a background task batches them to the store on
//! an interval. Dropping the last writer handle closes the channel and the
//! task drains whatever is buffered before exiting, so no events are lost
//! on orderly shutdown.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::Config;
use crate::store::{EventRow, LibSqlStore, now_ts};

/// Well-known event type names.
pub mod types {
    pub const JOB_CREATED: &str = "jobCreated";
    pub const JOB_ACKNOWLEDGED: &str = "jobAcknowledged";
    pub const JOB_RESULTED: &str = "jobResulted";
    pub const JOB_RESULTED_BUT_NOT_PERSISTED: &str = "functionResultedButNotPersisted";
    pub const JOB_STALLED: &str = "jobStalled";
    pub const JOB_RECOVERED: &str = "jobRecovered";
    pub const JOB_STALLED_TOO_MANY_TIMES: &str = "jobStalledTooManyTimes";
    pub const JOB_CANCELLED: &str = "jobCancelled";
    pub const APPROVAL_REQUESTED: &str = "approvalRequested";
    pub const APPROVAL_GRANTED: &str = "approvalGranted";
    pub const APPROVAL_DENIED: &str = "approvalDenied";
    pub const MACHINE_STALLED: &str = "machineStalled";
    pub const RUN_STATUS_CHANGED: &str = "runStatusChanged";
    pub const MODEL_INVOCATION: &str = "modelInvocation";
}

/// Cloneable handle for emitting events.
#[derive(Clone)]
pub struct EventWriter {
    tx: mpsc::Sender<EventRow>,
}

/// The background flusher task. Await [`EventWriterTask::join`] after all
/// writer handles are dropped to guarantee the final drain completed.
pub struct EventWriterTask {
    handle: JoinHandle<()>,
}

impl EventWriter {
    /// Spawn the writer and its flusher task.
    pub fn spawn(store: LibSqlStore, config: &Config) -> (Self, EventWriterTask) {
        let (tx, rx) = mpsc::channel(config.event_buffer_capacity);
        let interval = config.event_flush_interval;
        let handle = tokio::spawn(flush_loop(store, rx, interval));
        (Self { tx }, EventWriterTask { handle })
    }

    /// Queue an event. Never blocks; drops the event with a warning if the
    /// buffer is full.
    pub fn write(&self, mut event: EventRow) {
        if event.created_at.is_empty() {
            event.created_at = now_ts();
        }
        if let Err(e) = self.tx.try_send(event) {
            warn!(error = %e, "Event buffer full, dropping event");
        }
    }

    /// Convenience for the common job-scoped event shape.
    pub fn job_event(&self, cluster_id: &str, event_type: &str, job_id: &str) -> JobEventBuilder {
        JobEventBuilder {
            writer: self,
            row: EventRow {
                cluster_id: cluster_id.to_string(),
                event_type: event_type.to_string(),
                job_id: Some(job_id.to_string()),
                created_at: now_ts(),
                ..Default::default()
            },
        }
    }
}

/// Builder used at emission sites to attach optional fields tersely.
pub struct JobEventBuilder<'a> {
    writer: &'a EventWriter,
    row: EventRow,
}

impl JobEventBuilder<'_> {
    pub fn machine(mut self, machine_id: &str) -> Self {
        self.row.machine_id = Some(machine_id.to_string());
        self
    }

    pub fn run(mut self, run_id: &str) -> Self {
        self.row.run_id = Some(run_id.to_string());
        self
    }

    pub fn target_fn(mut self, target_fn: &str) -> Self {
        self.row.target_fn = Some(target_fn.to_string());
        self
    }

    pub fn result_kind(mut self, kind: &str) -> Self {
        self.row.result_kind = Some(kind.to_string());
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.row.status = Some(status.to_string());
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.row.meta = Some(meta);
        self
    }

    pub fn emit(self) {
        self.writer.write(self.row);
    }
}

impl EventWriterTask {
    /// Wait for the flusher to drain and exit. Call after dropping every
    /// `EventWriter` clone.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

async fn flush_loop(
    store: LibSqlStore,
    mut rx: mpsc::Receiver<EventRow>,
    interval: std::time::Duration,
) {
    let mut buffer: Vec<EventRow> = Vec::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Some(event) => buffer.push(event),
                    None => {
                        flush(&store, &mut buffer).await;
                        debug!("Event writer drained");
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                flush(&store, &mut buffer).await;
            }
        }
    }
}

async fn flush(store: &LibSqlStore, buffer: &mut Vec<EventRow>) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);
    let count = batch.len();
    if let Err(e) = store.insert_events(&batch).await {
        warn!(error = %e, count, "Failed to flush event batch");
    } else {
        debug!(count, "Flushed events");
    }
}
