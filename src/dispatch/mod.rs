//! Job dispatch — creation, claiming, results, approvals.
//!
//! The dispatch service is the only write path for job rows. All
//! coordination rules (idempotent creation, exclusive claims, guarded
//! result persistence, first-decision approvals) live in the store's
//! conditional updates; this layer adds config defaults, caching, long
//! polling, oversize result redirection, event emission, and run resume
//! signalling.

pub mod reaper;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, JobError, Result};
use crate::events::{EventWriter, types};
use crate::runs::queue::RunQueue;
use crate::runs::{background_run_id, is_background_run};
use crate::schema::{SchemaNode, extract_key_path, validate_name};
use crate::store::{ClaimedJob, FunctionConfig, Job, JobInsert, LibSqlStore, ResultKind};

/// Result message recorded when a human denies an approval request.
pub const APPROVAL_DENIED_MESSAGE: &str = "This call was denied by the user.";

/// Parameters for creating a job.
#[derive(Debug, Clone)]
pub struct CreateJobParams {
    pub cluster_id: String,
    pub service: String,
    pub target_fn: String,
    pub target_args: Value,
    /// Owning run; `None` attributes the job to the cluster's background run.
    pub run_id: Option<String>,
    /// Stable caller-supplied id. Re-submitting the same id returns the
    /// existing job instead of creating a duplicate.
    pub tool_call_id: Option<String>,
    pub auth_context: Option<Value>,
    pub run_context: Option<Value>,
}

/// Outcome of a create call.
#[derive(Debug, Clone)]
pub struct CreatedJob {
    pub id: String,
    /// `false` when an existing row (idempotent replay or cache hit) was
    /// returned instead.
    pub created: bool,
    /// `true` when the id refers to a prior cached resolution.
    pub cached: bool,
}

/// Job dispatch service.
#[derive(Clone)]
pub struct DispatchService {
    store: LibSqlStore,
    events: EventWriter,
    queue: Arc<dyn RunQueue>,
    config: Arc<Config>,
}

impl DispatchService {
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
        }
    }

    pub fn store(&self) -> &LibSqlStore {
        &self.store
    }

    /// Create a job, or return the existing one for a replayed tool call id
    /// or a fresh cached resolution.
    pub async fn create_job(&self, params: CreateJobParams) -> Result<CreatedJob> {
        validate_name(&params.service).map_err(Error::Schema)?;
        validate_name(&params.target_fn).map_err(Error::Schema)?;
        if !params.target_args.is_object() {
            return Err(JobError::InvalidArguments {
                reason: "target args must be an object".into(),
            }
            .into());
        }

        let function_config = self
            .resolve_function_config(
                &params.cluster_id,
                &params.service,
                &params.target_fn,
                &params.target_args,
            )
            .await?;

        let cache_key = function_config
            .as_ref()
            .and_then(|c| c.cache.as_ref())
            .and_then(|cache| {
                extract_key_path(&cache.key_path, &params.target_args).map(|key| {
                    let key = match key {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key, cache.ttl_seconds)
                })
            });

        if let Some((key, ttl_seconds)) = &cache_key {
            let hit = self
                .store
                .find_cached_resolution(
                    &params.cluster_id,
                    &params.service,
                    &params.target_fn,
                    key,
                    *ttl_seconds,
                )
                .await
                .map_err(Error::Store)?;
            if let Some(job_id) = hit {
                debug!(job_id, service = %params.service, "Cache hit, reusing resolved job");
                return Ok(CreatedJob {
                    id: job_id,
                    created: false,
                    cached: true,
                });
            }
        }

        let id = params
            .tool_call_id
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        let run_id = params
            .run_id
            .clone()
            .unwrap_or_else(|| background_run_id(&params.cluster_id));

        let max_attempts = function_config
            .as_ref()
            .and_then(|c| c.retry_count_on_stall)
            .map(|retries| retries + 1)
            .unwrap_or(self.config.default_max_attempts);
        let timeout_seconds = function_config
            .as_ref()
            .and_then(|c| c.timeout_seconds)
            .unwrap_or(self.config.default_job_timeout_seconds);

        let created = self
            .store
            .insert_job(&JobInsert {
                id: id.clone(),
                cluster_id: params.cluster_id.clone(),
                service: params.service.clone(),
                target_fn: params.target_fn.clone(),
                target_args: params.target_args.clone(),
                cache_key: cache_key.map(|(key, _)| key),
                max_attempts,
                timeout_seconds,
                run_id,
                auth_context: params.auth_context.clone(),
                run_context: params.run_context.clone(),
            })
            .await
            .map_err(Error::Store)?;

        if created {
            self.events
                .job_event(&params.cluster_id, types::JOB_CREATED, &id)
                .target_fn(&params.target_fn)
                .emit();
            // Approval-gated functions wait for a decision before any
            // worker may claim the job.
            if function_config
                .as_ref()
                .is_some_and(|c| c.requires_approval)
            {
                self.request_approval(&params.cluster_id, &id).await?;
            }
        } else {
            debug!(job_id = %id, "Job already exists, idempotent replay");
        }

        Ok(CreatedJob {
            id,
            created,
            cached: false,
        })
    }

    /// Claim pending jobs for a worker machine, long-polling up to `wait`.
    /// Each poll refreshes the machine's liveness ping.
    pub async fn poll_jobs(
        &self,
        cluster_id: &str,
        service: &str,
        machine_id: &str,
        limit: usize,
        wait: Option<Duration>,
    ) -> Result<Vec<ClaimedJob>> {
        self.store
            .upsert_machine_ping(cluster_id, machine_id)
            .await
            .map_err(Error::Store)?;

        let wait = wait
            .unwrap_or(Duration::ZERO)
            .min(self.config.long_poll_timeout);
        let deadline = Instant::now() + wait;

        loop {
            let claimed = self
                .store
                .claim_pending(cluster_id, service, machine_id, limit)
                .await
                .map_err(Error::Store)?;
            if !claimed.is_empty() {
                for job in &claimed {
                    self.events
                        .job_event(cluster_id, types::JOB_ACKNOWLEDGED, &job.id)
                        .machine(machine_id)
                        .target_fn(&job.target_fn)
                        .emit();
                }
                return Ok(claimed);
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Explicitly claim a single job (used when a worker was handed a job id
    /// out of band). Fails if the job is not pending.
    pub async fn acknowledge_job(
        &self,
        cluster_id: &str,
        job_id: &str,
        machine_id: &str,
    ) -> Result<()> {
        let acknowledged = self
            .store
            .acknowledge(cluster_id, job_id, machine_id)
            .await
            .map_err(Error::Store)?;
        if acknowledged {
            self.events
                .job_event(cluster_id, types::JOB_ACKNOWLEDGED, job_id)
                .machine(machine_id)
                .emit();
            return Ok(());
        }
        match self.store.get_job(cluster_id, job_id).await.map_err(Error::Store)? {
            Some(_) => Err(JobError::AlreadyClaimed {
                id: job_id.to_string(),
            }
            .into()),
            None => Err(JobError::NotFound {
                id: job_id.to_string(),
            }
            .into()),
        }
    }

    /// Record a worker's result. Returns `false` when the report was stale
    /// (the job had been reclaimed or already resolved) and was discarded.
    pub async fn persist_job_result(
        &self,
        cluster_id: &str,
        job_id: &str,
        machine_id: &str,
        result: Value,
        result_kind: ResultKind,
        execution_time_ms: Option<i64>,
    ) -> Result<bool> {
        let serialized = result.to_string();
        let stored_result = if serialized.len() > self.config.max_inline_result_bytes {
            let blob_id = self
                .store
                .insert_blob(cluster_id, Some(job_id), None, "result", &serialized)
                .await
                .map_err(Error::Store)?;
            info!(
                job_id,
                size = serialized.len(),
                blob_id,
                "Result too large for inline storage, moved to blob"
            );
            json!({
                "message": "The result was too large to return directly and has been stored.",
                "blobId": blob_id,
                "size": serialized.len(),
            })
        } else {
            result
        };

        let persisted = self
            .store
            .persist_result(
                cluster_id,
                job_id,
                machine_id,
                &stored_result,
                result_kind,
                execution_time_ms,
            )
            .await
            .map_err(Error::Store)?;

        match persisted {
            Some((run_id, _service, target_fn)) => {
                self.events
                    .job_event(cluster_id, types::JOB_RESULTED, job_id)
                    .machine(machine_id)
                    .run(&run_id)
                    .target_fn(&target_fn)
                    .result_kind(result_kind.as_str())
                    .emit();
                self.resume_run(cluster_id, &run_id);
                Ok(true)
            }
            None => {
                warn!(
                    job_id,
                    machine_id, "Discarding job result, job is no longer owned by this machine"
                );
                self.events
                    .job_event(cluster_id, types::JOB_RESULTED_BUT_NOT_PERSISTED, job_id)
                    .machine(machine_id)
                    .emit();
                Ok(false)
            }
        }
    }

    /// Flag a running job as requiring a human approval decision.
    pub async fn request_approval(&self, cluster_id: &str, job_id: &str) -> Result<()> {
        let flagged = self
            .store
            .request_approval(cluster_id, job_id)
            .await
            .map_err(Error::Store)?;
        let Some((run_id, _service, target_fn)) = flagged else {
            return Err(JobError::NotFound {
                id: job_id.to_string(),
            }
            .into());
        };
        self.events
            .job_event(cluster_id, types::APPROVAL_REQUESTED, job_id)
            .run(&run_id)
            .target_fn(&target_fn)
            .emit();
        self.resume_run(cluster_id, &run_id);
        Ok(())
    }

    /// Apply a human approval decision. The first decision wins; a repeat
    /// submission fails with `AlreadyDecided`.
    pub async fn submit_approval(
        &self,
        cluster_id: &str,
        job_id: &str,
        approved: bool,
    ) -> Result<()> {
        if approved {
            let applied = self
                .store
                .approve_job(cluster_id, job_id)
                .await
                .map_err(Error::Store)?;
            if !applied {
                return Err(self.approval_conflict(cluster_id, job_id, "approved").await?);
            }
            self.events
                .job_event(cluster_id, types::APPROVAL_GRANTED, job_id)
                .emit();
            // The job is pending again; a worker poll will pick it up.
            return Ok(());
        }

        let denied = self
            .store
            .deny_job(
                cluster_id,
                job_id,
                &json!({ "message": APPROVAL_DENIED_MESSAGE }),
            )
            .await
            .map_err(Error::Store)?;
        match denied {
            Some(run_id) => {
                self.events
                    .job_event(cluster_id, types::APPROVAL_DENIED, job_id)
                    .run(&run_id)
                    .emit();
                self.resume_run(cluster_id, &run_id);
                Ok(())
            }
            None => Err(self.approval_conflict(cluster_id, job_id, "denied").await?),
        }
    }

    /// Explain why an approval decision affected zero rows.
    async fn approval_conflict(
        &self,
        cluster_id: &str,
        job_id: &str,
        target: &str,
    ) -> Result<Error> {
        let error = match self.store.get_job(cluster_id, job_id).await.map_err(Error::Store)? {
            None => JobError::NotFound {
                id: job_id.to_string(),
            },
            Some(job) if job.approved.is_some() => JobError::AlreadyDecided {
                id: job_id.to_string(),
            },
            // Approval was never requested for this job.
            Some(job) => JobError::InvalidTransition {
                id: job_id.to_string(),
                state: job.status.as_str().to_string(),
                target: target.to_string(),
            },
        };
        Ok(error.into())
    }

    /// Cancel a job that has not yet reached a terminal state.
    pub async fn cancel_job(&self, cluster_id: &str, job_id: &str) -> Result<()> {
        let cancelled = self
            .store
            .cancel_job(cluster_id, job_id, &Value::Null)
            .await
            .map_err(Error::Store)?;
        match cancelled {
            Some(run_id) => {
                self.events
                    .job_event(cluster_id, types::JOB_CANCELLED, job_id)
                    .run(&run_id)
                    .emit();
                self.resume_run(cluster_id, &run_id);
                Ok(())
            }
            None => match self.store.get_job(cluster_id, job_id).await.map_err(Error::Store)? {
                Some(job) => Err(JobError::InvalidTransition {
                    id: job_id.to_string(),
                    state: job.status.as_str().to_string(),
                    target: "failure".into(),
                }
                .into()),
                None => Err(JobError::NotFound {
                    id: job_id.to_string(),
                }
                .into()),
            },
        }
    }

    pub async fn get_job(&self, cluster_id: &str, job_id: &str) -> Result<Job> {
        self.store
            .get_job(cluster_id, job_id)
            .await
            .map_err(Error::Store)?
            .ok_or_else(|| {
                JobError::NotFound {
                    id: job_id.to_string(),
                }
                .into()
            })
    }

    /// Block until a job resolves, polling at the configured interval.
    /// Fails with a poll timeout once `ttl` (default from config) elapses.
    pub async fn get_job_status_sync(
        &self,
        cluster_id: &str,
        job_id: &str,
        ttl: Option<Duration>,
    ) -> Result<Job> {
        let ttl = ttl.unwrap_or(self.config.sync_wait_ttl);
        let deadline = Instant::now() + ttl;
        loop {
            let job = self.get_job(cluster_id, job_id).await?;
            if job.status.is_terminal() || job.resulted_at.is_some() {
                return Ok(job);
            }
            if Instant::now() >= deadline {
                return Err(JobError::PollTimeout {
                    id: job_id.to_string(),
                    ttl,
                }
                .into());
            }
            sleep(self.config.poll_interval).await;
        }
    }

    async fn resolve_function_config(
        &self,
        cluster_id: &str,
        service: &str,
        target_fn: &str,
        target_args: &Value,
    ) -> Result<Option<FunctionConfig>> {
        let Some(definition) = self
            .store
            .get_service_definition(cluster_id, service)
            .await
            .map_err(Error::Store)?
        else {
            // Not yet registered; the job queues with defaults.
            return Ok(None);
        };

        let Some(function) = definition.function(target_fn) else {
            return Err(JobError::NotRegistered {
                service: service.to_string(),
                function: target_fn.to_string(),
            }
            .into());
        };

        if let Some(raw_schema) = &function.schema {
            let schema = SchemaNode::parse(raw_schema).map_err(Error::Schema)?;
            let violations = schema.validate(target_args);
            if !violations.is_empty() {
                let reason = violations
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(JobError::InvalidArguments { reason }.into());
            }
        }

        Ok(function.config.clone())
    }

    fn resume_run(&self, cluster_id: &str, run_id: &str) {
        if is_background_run(cluster_id, run_id) {
            return;
        }
        self.queue.signal(cluster_id, run_id);
    }
}
