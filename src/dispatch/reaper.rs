//! Stall reaper — background recovery of jobs whose workers went silent.
//!
//! Runs on a short interval under a named lease lock, so any number of
//! dispatcher processes can run the reaper and exactly one sweeps at a
//! time. Recovery is two-phase: a timed-out running job is first CAS'd to
//! `stalled`, then resolved to either `pending` (attempts remain) or a
//! terminal `failure`. The intermediate status means a sweep that dies
//! midway leaves the job where the next sweep will finish the resolution.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::events::{EventWriter, types};
use crate::runs::is_background_run;
use crate::runs::queue::RunQueue;
use crate::store::LibSqlStore;

const REAPER_LOCK: &str = "stall-reaper";

pub struct StallReaper {
    store: LibSqlStore,
    events: EventWriter,
    queue: Arc<dyn RunQueue>,
    config: Arc<Config>,
    holder: String,
}

impl StallReaper {
    pub fn new(
        store: LibSqlStore,
        events: EventWriter,
        queue: Arc<dyn RunQueue>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            events,
            queue,
            config,
            holder: Uuid::new_v4().to_string(),
        }
    }

    /// Run the sweep loop until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.reaper_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    error!(error = %e, "Stall sweep failed");
                }
            }
        })
    }

    /// One full sweep. Public so deployments can also trigger it on demand.
    pub async fn sweep(&self) -> Result<()> {
        let lease = self.config.reaper_interval.max(Duration::from_secs(5)) * 2;
        if !self
            .store
            .try_acquire_lock(REAPER_LOCK, &self.holder, lease)
            .await
            .map_err(crate::error::Error::Store)?
        {
            debug!("Another process holds the reaper lock, skipping sweep");
            return Ok(());
        }

        let outcome = self.sweep_locked().await;
        if let Err(e) = self.store.release_lock(REAPER_LOCK, &self.holder).await {
            warn!(error = %e, "Failed to release reaper lock");
        }
        outcome
    }

    async fn sweep_locked(&self) -> Result<()> {
        self.stall_machines().await?;
        self.stall_timed_out_jobs().await?;
        self.resolve_stalled_jobs().await?;
        Ok(())
    }

    /// Deactivate machines that stopped pinging and stall their jobs.
    async fn stall_machines(&self) -> Result<()> {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(self.config.machine_stall_timeout).unwrap_or_default();
        let stale = self
            .store
            .mark_stale_machines(cutoff)
            .await
            .map_err(crate::error::Error::Store)?;
        for (cluster_id, machine_id) in &stale {
            info!(cluster_id, machine_id, "Machine stopped pinging, marked inactive");
            self.events.write(crate::store::EventRow {
                cluster_id: cluster_id.clone(),
                event_type: types::MACHINE_STALLED.into(),
                machine_id: Some(machine_id.clone()),
                ..Default::default()
            });
        }

        if stale.is_empty() {
            return Ok(());
        }
        let orphaned = self
            .store
            .running_jobs_on_inactive_machines()
            .await
            .map_err(crate::error::Error::Store)?;
        for job in orphaned {
            if self
                .store
                .mark_stalled(&job.cluster_id, &job.id)
                .await
                .map_err(crate::error::Error::Store)?
            {
                self.events
                    .job_event(&job.cluster_id, types::JOB_STALLED, &job.id)
                    .target_fn(&job.target_fn)
                    .run(&job.run_id)
                    .emit();
            }
        }
        Ok(())
    }

    /// Stall running jobs whose claim outlived their own timeout.
    async fn stall_timed_out_jobs(&self) -> Result<()> {
        let approval_cutoff = self
            .config
            .approval_timeout
            .and_then(|t| chrono::Duration::from_std(t).ok())
            .map(|t| chrono::Utc::now() - t);
        let timed_out = self
            .store
            .timed_out_running_jobs(approval_cutoff)
            .await
            .map_err(crate::error::Error::Store)?;
        for job in timed_out {
            if self
                .store
                .mark_stalled(&job.cluster_id, &job.id)
                .await
                .map_err(crate::error::Error::Store)?
            {
                info!(job_id = %job.id, target_fn = %job.target_fn, "Job stalled");
                self.events
                    .job_event(&job.cluster_id, types::JOB_STALLED, &job.id)
                    .target_fn(&job.target_fn)
                    .run(&job.run_id)
                    .emit();
            }
        }
        Ok(())
    }

    /// Resolve every stalled job: retry while attempts remain, otherwise
    /// fail terminally and wake the owning run.
    async fn resolve_stalled_jobs(&self) -> Result<()> {
        let stalled = self
            .store
            .stalled_jobs()
            .await
            .map_err(crate::error::Error::Store)?;
        for job in stalled {
            if job.remaining_attempts > 0 {
                if self
                    .store
                    .recover_stalled(&job.cluster_id, &job.id)
                    .await
                    .map_err(crate::error::Error::Store)?
                {
                    info!(job_id = %job.id, "Stalled job returned to pending");
                    self.events
                        .job_event(&job.cluster_id, types::JOB_RECOVERED, &job.id)
                        .target_fn(&job.target_fn)
                        .emit();
                }
                continue;
            }

            let failed = self
                .store
                .fail_stalled(&job.cluster_id, &job.id)
                .await
                .map_err(crate::error::Error::Store)?;
            if let Some(run_id) = failed {
                warn!(job_id = %job.id, "Job stalled too many times, failing");
                self.events
                    .job_event(&job.cluster_id, types::JOB_STALLED_TOO_MANY_TIMES, &job.id)
                    .target_fn(&job.target_fn)
                    .run(&run_id)
                    .emit();
                if !is_background_run(&job.cluster_id, &run_id) {
                    self.queue.signal(&job.cluster_id, &run_id);
                }
            }
        }
        Ok(())
    }
}
