//! Run resume signalling.
//!
//! Anything that changes a run's inputs (a job result, an approval, a new
//! user message) signals the run's id into a queue. A consumer task takes
//! signals off the queue and steps the run under a per-run lock, so
//! concurrent signals for one run collapse into serialized processing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::store::LibSqlStore;

/// A request to (re)process a run.
#[derive(Debug, Clone)]
pub struct ResumeSignal {
    pub cluster_id: String,
    pub run_id: String,
    /// How many times this signal failed to take the run lock.
    pub lock_attempts: u32,
}

/// Abstract producer side of the run queue.
pub trait RunQueue: Send + Sync {
    fn signal(&self, cluster_id: &str, run_id: &str);
}

/// Queue that drops every signal (tests that exercise dispatch alone).
pub struct NullQueue;

impl RunQueue for NullQueue {
    fn signal(&self, _cluster_id: &str, _run_id: &str) {}
}

/// In-process queue backed by an unbounded channel.
pub struct InProcessQueue {
    tx: mpsc::UnboundedSender<ResumeSignal>,
}

impl InProcessQueue {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ResumeSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn send(&self, signal: ResumeSignal) {
        if self.tx.send(signal).is_err() {
            warn!("Run queue consumer has shut down, dropping signal");
        }
    }
}

impl RunQueue for InProcessQueue {
    fn signal(&self, cluster_id: &str, run_id: &str) {
        self.send(ResumeSignal {
            cluster_id: cluster_id.to_string(),
            run_id: run_id.to_string(),
            lock_attempts: 0,
        });
    }
}

/// What the consumer does with each signal once the run lock is held.
#[async_trait::async_trait]
pub trait RunProcessor: Send + Sync {
    async fn process(&self, cluster_id: &str, run_id: &str) -> crate::error::Result<()>;
}

/// Consume resume signals, serializing per run via a named store lock.
///
/// A signal that loses the lock race is re-queued with exponential delay
/// (5^attempts seconds) and abandoned after `max_lock_attempts`.
pub fn spawn_consumer(
    store: LibSqlStore,
    queue: Arc<InProcessQueue>,
    mut rx: mpsc::UnboundedReceiver<ResumeSignal>,
    processor: Arc<dyn RunProcessor>,
    config: &Config,
) -> JoinHandle<()> {
    let max_lock_attempts = config.max_lock_attempts;
    let holder = uuid::Uuid::new_v4().to_string();

    tokio::spawn(async move {
        while let Some(signal) = rx.recv().await {
            let lock_name = format!("run-{}-{}", signal.cluster_id, signal.run_id);
            let acquired = match store
                .try_acquire_lock(&lock_name, &holder, Duration::from_secs(60))
                .await
            {
                Ok(acquired) => acquired,
                Err(e) => {
                    error!(error = %e, run_id = %signal.run_id, "Run lock check failed");
                    continue;
                }
            };

            if !acquired {
                let attempts = signal.lock_attempts + 1;
                if attempts >= max_lock_attempts {
                    warn!(
                        run_id = %signal.run_id,
                        attempts,
                        "Dropping resume signal, could not acquire run lock"
                    );
                    continue;
                }
                let delay = Duration::from_secs(5u64.pow(attempts));
                debug!(run_id = %signal.run_id, attempts, ?delay, "Run busy, re-queueing");
                let queue = Arc::clone(&queue);
                let retry = ResumeSignal {
                    lock_attempts: attempts,
                    ..signal
                };
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    queue.send(retry);
                });
                continue;
            }

            if let Err(e) = processor.process(&signal.cluster_id, &signal.run_id).await {
                error!(error = %e, run_id = %signal.run_id, "Run processing failed");
            }

            if let Err(e) = store.release_lock(&lock_name, &holder).await {
                error!(error = %e, run_id = %signal.run_id, "Failed to release run lock");
            }
        }
        debug!("Run queue consumer exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    #[async_trait::async_trait]
    impl RunProcessor for Counter {
        async fn process(&self, _cluster_id: &str, _run_id: &str) -> crate::error::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn signals_reach_the_processor() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        let (queue, rx) = InProcessQueue::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let handle = spawn_consumer(
            store,
            Arc::clone(&queue),
            rx,
            Arc::clone(&counter) as Arc<dyn RunProcessor>,
            &Config::default(),
        );

        queue.signal("c1", "r1");
        queue.signal("c1", "r2");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        // The consumer keeps a queue clone for re-queueing, so the channel
        // stays open; stop the task directly.
        handle.abort();
    }
}
