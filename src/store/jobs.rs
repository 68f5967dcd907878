//! Job rows — conditional status transitions that make multi-process
//! dispatch safe.
//!
//! Every mutating operation here is a single row-scoped `UPDATE ... WHERE`
//! guarded on the current status (and, where relevant, the claiming
//! machine), so a lost race shows up as zero affected rows instead of a
//! double claim. SQLite serializes writers, which makes each conditional
//! update atomic; the claim loop in `claim_pending` is the compare-and-swap
//! equivalent of `FOR UPDATE SKIP LOCKED`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use libsql::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{LibSqlStore, fmt_ts, now_ts, parse_opt_ts, parse_ts};
use crate::error::StoreError;

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failure,
    Stalled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
            JobStatus::Stalled => "stalled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => JobStatus::Running,
            "success" => JobStatus::Success,
            "failure" => JobStatus::Failure,
            "stalled" => JobStatus::Stalled,
            _ => JobStatus::Pending,
        }
    }

    /// Terminal states cannot transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure)
    }
}

/// How a job result should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Resolution,
    Rejection,
    Interrupt,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Resolution => "resolution",
            ResultKind::Rejection => "rejection",
            ResultKind::Interrupt => "interrupt",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "resolution" => Some(ResultKind::Resolution),
            "rejection" => Some(ResultKind::Rejection),
            "interrupt" => Some(ResultKind::Interrupt),
            _ => None,
        }
    }
}

/// A full job record.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub cluster_id: String,
    pub service: String,
    pub target_fn: String,
    pub target_args: Value,
    pub status: JobStatus,
    pub executing_machine_id: Option<String>,
    pub cache_key: Option<String>,
    pub remaining_attempts: i64,
    pub timeout_seconds: u32,
    pub result: Option<Value>,
    pub result_kind: Option<ResultKind>,
    pub resulted_at: Option<DateTime<Utc>>,
    pub last_claimed_at: Option<DateTime<Utc>>,
    pub execution_time_ms: Option<i64>,
    pub approval_requested: bool,
    pub approved: Option<bool>,
    pub run_id: String,
    pub auth_context: Option<Value>,
    pub run_context: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// An undecided approval request exempts the job from stall timeout.
    pub fn approval_pending(&self) -> bool {
        self.approval_requested && self.approved.is_none()
    }
}

/// Parameters for inserting a new job row.
#[derive(Debug, Clone)]
pub struct JobInsert {
    pub id: String,
    pub cluster_id: String,
    pub service: String,
    pub target_fn: String,
    pub target_args: Value,
    pub cache_key: Option<String>,
    pub max_attempts: u32,
    pub timeout_seconds: u32,
    pub run_id: String,
    pub auth_context: Option<Value>,
    pub run_context: Option<Value>,
}

/// The fields handed to a worker when it claims a job.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: String,
    pub target_fn: String,
    pub target_args: Value,
    pub auth_context: Option<Value>,
    pub run_context: Option<Value>,
    pub approved: Option<bool>,
}

/// A job currently marked stalled, awaiting recovery or failure.
#[derive(Debug, Clone)]
pub struct StalledJob {
    pub id: String,
    pub cluster_id: String,
    pub service: String,
    pub target_fn: String,
    pub remaining_attempts: i64,
    pub run_id: String,
}

const JOB_COLUMNS: &str = "id, cluster_id, service, target_fn, target_args, status, \
     executing_machine_id, cache_key, remaining_attempts, timeout_seconds, result, \
     result_kind, resulted_at, last_claimed_at, execution_time_ms, approval_requested, \
     approved, run_id, auth_context, run_context, created_at";

fn row_to_job(row: &libsql::Row) -> Result<Job, StoreError> {
    let args_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let result_str: Option<String> = row.get(10)?;
    let kind_str: Option<String> = row.get(11)?;
    let resulted_str: Option<String> = row.get(12)?;
    let claimed_str: Option<String> = row.get(13)?;
    let approved_int: Option<i64> = row.get(16)?;
    let auth_str: Option<String> = row.get(18)?;
    let run_ctx_str: Option<String> = row.get(19)?;
    let created_str: String = row.get(20)?;

    Ok(Job {
        id: row.get(0)?,
        cluster_id: row.get(1)?,
        service: row.get(2)?,
        target_fn: row.get(3)?,
        target_args: serde_json::from_str(&args_str)?,
        status: JobStatus::parse(&status_str),
        executing_machine_id: row.get(6)?,
        cache_key: row.get(7)?,
        remaining_attempts: row.get(8)?,
        timeout_seconds: row.get::<i64>(9)? as u32,
        result: result_str.as_deref().map(serde_json::from_str).transpose()?,
        result_kind: kind_str.as_deref().and_then(ResultKind::parse),
        resulted_at: parse_opt_ts(&resulted_str),
        last_claimed_at: parse_opt_ts(&claimed_str),
        execution_time_ms: row.get(14)?,
        approval_requested: row.get::<i64>(15)? != 0,
        approved: approved_int.map(|v| v != 0),
        run_id: row.get(17)?,
        auth_context: auth_str.as_deref().map(serde_json::from_str).transpose()?,
        run_context: run_ctx_str
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        created_at: parse_ts(&created_str),
    })
}

fn json_opt(value: &Option<Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

impl LibSqlStore {
    /// Insert a new job row. Returns `false` if a job with this id already
    /// exists for the cluster (idempotent creation).
    pub async fn insert_job(&self, insert: &JobInsert) -> Result<bool, StoreError> {
        let now = now_ts();
        let affected = self
            .conn()
            .execute(
                "INSERT INTO jobs (id, cluster_id, service, target_fn, target_args, status, \
                 cache_key, remaining_attempts, timeout_seconds, approval_requested, run_id, \
                 auth_context, run_context, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8, 0, ?9, ?10, ?11, ?12, ?12) \
                 ON CONFLICT (cluster_id, id) DO NOTHING",
                params![
                    insert.id.as_str(),
                    insert.cluster_id.as_str(),
                    insert.service.as_str(),
                    insert.target_fn.as_str(),
                    insert.target_args.to_string(),
                    insert.cache_key.clone(),
                    insert.max_attempts as i64,
                    insert.timeout_seconds as i64,
                    insert.run_id.as_str(),
                    json_opt(&insert.auth_context),
                    json_opt(&insert.run_context),
                    now,
                ],
            )
            .await?;
        Ok(affected == 1)
    }

    /// Find a prior successful resolution for the same cache key within ttl.
    pub async fn find_cached_resolution(
        &self,
        cluster_id: &str,
        service: &str,
        target_fn: &str,
        cache_key: &str,
        ttl_seconds: u32,
    ) -> Result<Option<String>, StoreError> {
        let cutoff = fmt_ts(Utc::now() - ChronoDuration::seconds(ttl_seconds as i64));
        let mut rows = self
            .conn()
            .query(
                "SELECT id FROM jobs WHERE cluster_id = ?1 AND service = ?2 \
                 AND target_fn = ?3 AND cache_key = ?4 AND status = 'success' \
                 AND result_kind = 'resolution' AND resulted_at >= ?5 \
                 ORDER BY resulted_at DESC LIMIT 1",
                params![cluster_id, service, target_fn, cache_key, cutoff],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Claim up to `limit` pending jobs for a machine.
    ///
    /// Candidates are selected and then claimed one by one with a
    /// status-guarded update; a row lost to a concurrent poller simply
    /// fails its guard and is skipped. Claiming flips the job to running,
    /// stamps the machine, and consumes one attempt.
    pub async fn claim_pending(
        &self,
        cluster_id: &str,
        service: &str,
        machine_id: &str,
        limit: usize,
    ) -> Result<Vec<ClaimedJob>, StoreError> {
        let mut candidate_ids = Vec::new();
        {
            let mut rows = self
                .conn()
                .query(
                    "SELECT id FROM jobs WHERE cluster_id = ?1 AND service = ?2 \
                     AND status = 'pending' \
                     AND NOT (approval_requested = 1 AND approved IS NULL) \
                     ORDER BY id LIMIT ?3",
                    params![cluster_id, service, limit as i64],
                )
                .await?;
            while let Some(row) = rows.next().await? {
                candidate_ids.push(row.get::<String>(0)?);
            }
        }

        let mut claimed = Vec::new();
        let now = now_ts();
        for id in candidate_ids {
            let affected = self
                .conn()
                .execute(
                    "UPDATE jobs SET status = 'running', \
                     remaining_attempts = remaining_attempts - 1, \
                     last_claimed_at = ?1, executing_machine_id = ?2, updated_at = ?1 \
                     WHERE cluster_id = ?3 AND id = ?4 AND status = 'pending'",
                    params![now.as_str(), machine_id, cluster_id, id.as_str()],
                )
                .await?;
            if affected != 1 {
                continue;
            }

            let mut rows = self
                .conn()
                .query(
                    "SELECT id, target_fn, target_args, auth_context, run_context, approved \
                     FROM jobs WHERE cluster_id = ?1 AND id = ?2",
                    params![cluster_id, id.as_str()],
                )
                .await?;
            if let Some(row) = rows.next().await? {
                let args_str: String = row.get(2)?;
                let auth_str: Option<String> = row.get(3)?;
                let ctx_str: Option<String> = row.get(4)?;
                let approved_int: Option<i64> = row.get(5)?;
                claimed.push(ClaimedJob {
                    id: row.get(0)?,
                    target_fn: row.get(1)?,
                    target_args: serde_json::from_str(&args_str)?,
                    auth_context: auth_str.as_deref().map(serde_json::from_str).transpose()?,
                    run_context: ctx_str.as_deref().map(serde_json::from_str).transpose()?,
                    approved: approved_int.map(|v| v != 0),
                });
            }
        }
        Ok(claimed)
    }

    /// Explicit claim of a single known job (service-initiated flows).
    /// Fails the guard if the job is no longer pending.
    pub async fn acknowledge(
        &self,
        cluster_id: &str,
        job_id: &str,
        machine_id: &str,
    ) -> Result<bool, StoreError> {
        let now = now_ts();
        let affected = self
            .conn()
            .execute(
                "UPDATE jobs SET status = 'running', \
                 remaining_attempts = remaining_attempts - 1, \
                 last_claimed_at = ?1, executing_machine_id = ?2, updated_at = ?1 \
                 WHERE cluster_id = ?3 AND id = ?4 AND status = 'pending'",
                params![now.as_str(), machine_id, cluster_id, job_id],
            )
            .await?;
        Ok(affected == 1)
    }

    /// Record a result for a running job.
    ///
    /// Guarded on the claiming machine and absence of a prior result, so a
    /// stale worker report after reclamation affects zero rows. Returns the
    /// `(run_id, service, target_fn)` of the updated row, or `None` when the
    /// guard failed.
    pub async fn persist_result(
        &self,
        cluster_id: &str,
        job_id: &str,
        machine_id: &str,
        result: &Value,
        result_kind: ResultKind,
        execution_time_ms: Option<i64>,
    ) -> Result<Option<(String, String, String)>, StoreError> {
        let now = now_ts();
        let mut rows = self
            .conn()
            .query(
                "UPDATE jobs SET result = ?1, result_kind = ?2, resulted_at = ?3, \
                 execution_time_ms = ?4, status = 'success', updated_at = ?3 \
                 WHERE cluster_id = ?5 AND id = ?6 AND executing_machine_id = ?7 \
                 AND status = 'running' AND resulted_at IS NULL \
                 RETURNING run_id, service, target_fn",
                params![
                    result.to_string(),
                    result_kind.as_str(),
                    now.as_str(),
                    execution_time_ms,
                    cluster_id,
                    job_id,
                    machine_id,
                ],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some((row.get(0)?, row.get(1)?, row.get(2)?))),
            None => Ok(None),
        }
    }

    /// Flag a job as requiring human approval.
    /// Returns `(run_id, service, target_fn)` of the flagged row.
    pub async fn request_approval(
        &self,
        cluster_id: &str,
        job_id: &str,
    ) -> Result<Option<(String, String, String)>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "UPDATE jobs SET approval_requested = 1, updated_at = ?1 \
                 WHERE cluster_id = ?2 AND id = ?3 \
                 RETURNING run_id, service, target_fn",
                params![now_ts(), cluster_id, job_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some((row.get(0)?, row.get(1)?, row.get(2)?))),
            None => Ok(None),
        }
    }

    /// Grant approval: restore the job to pending with a refreshed attempt
    /// and cleared claim. No-op if already decided (first decision wins).
    pub async fn approve_job(&self, cluster_id: &str, job_id: &str) -> Result<bool, StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE jobs SET approved = 1, status = 'pending', \
                 executing_machine_id = NULL, last_claimed_at = NULL, \
                 remaining_attempts = remaining_attempts + 1, updated_at = ?1 \
                 WHERE cluster_id = ?2 AND id = ?3 \
                 AND approval_requested = 1 AND approved IS NULL",
                params![now_ts(), cluster_id, job_id],
            )
            .await?;
        Ok(affected == 1)
    }

    /// Deny approval: terminate the job as a rejection. No-op if already
    /// decided. Returns the owning run id when applied.
    pub async fn deny_job(
        &self,
        cluster_id: &str,
        job_id: &str,
        result: &Value,
    ) -> Result<Option<String>, StoreError> {
        let now = now_ts();
        let mut rows = self
            .conn()
            .query(
                "UPDATE jobs SET approved = 0, status = 'success', \
                 result_kind = 'rejection', result = ?1, resulted_at = ?2, updated_at = ?2 \
                 WHERE cluster_id = ?3 AND id = ?4 \
                 AND approval_requested = 1 AND approved IS NULL \
                 RETURNING run_id",
                params![result.to_string(), now.as_str(), cluster_id, job_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Cancel a non-terminal job. Returns the owning run id when applied,
    /// `None` when the job was already terminal (or missing).
    ///
    /// The interrupt result kind marks the cancellation; `resulted_at`
    /// stays NULL since no worker ever reported a result.
    pub async fn cancel_job(
        &self,
        cluster_id: &str,
        job_id: &str,
        result: &Value,
    ) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "UPDATE jobs SET status = 'failure', result_kind = 'interrupt', \
                 result = ?1, updated_at = ?2 \
                 WHERE cluster_id = ?3 AND id = ?4 \
                 AND status IN ('pending', 'running', 'stalled') \
                 RETURNING run_id",
                params![result.to_string(), now_ts(), cluster_id, job_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Fetch a full job record.
    pub async fn get_job(&self, cluster_id: &str, job_id: &str) -> Result<Option<Job>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE cluster_id = ?1 AND id = ?2"),
                params![cluster_id, job_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_job(&row)?)),
            None => Ok(None),
        }
    }

    // ── Stall reaper queries ────────────────────────────────────────

    /// Running jobs whose last claim is older than their own timeout.
    /// Jobs blocked on an undecided approval are exempt unless
    /// `approval_cutoff` is provided (explicit approval-timeout policy).
    pub async fn timed_out_running_jobs(
        &self,
        approval_cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<StalledJob>, StoreError> {
        let now = Utc::now();
        let mut rows = self
            .conn()
            .query(
                "SELECT id, cluster_id, service, target_fn, remaining_attempts, run_id, \
                 last_claimed_at, timeout_seconds, approval_requested, approved \
                 FROM jobs WHERE status = 'running' AND last_claimed_at IS NOT NULL",
                (),
            )
            .await?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            let claimed_str: Option<String> = row.get(6)?;
            let timeout_seconds: i64 = row.get(7)?;
            let approval_requested: i64 = row.get(8)?;
            let approved: Option<i64> = row.get(9)?;

            let Some(claimed_at) = parse_opt_ts(&claimed_str) else {
                continue;
            };

            let approval_pending = approval_requested != 0 && approved.is_none();
            if approval_pending {
                // Blocked on a human, not a worker.
                match approval_cutoff {
                    Some(cutoff) if claimed_at < cutoff => {}
                    _ => continue,
                }
            } else if now - claimed_at < ChronoDuration::seconds(timeout_seconds) {
                continue;
            }

            out.push(StalledJob {
                id: row.get(0)?,
                cluster_id: row.get(1)?,
                service: row.get(2)?,
                target_fn: row.get(3)?,
                remaining_attempts: row.get(4)?,
                run_id: row.get(5)?,
            });
        }
        Ok(out)
    }

    /// CAS a running job to stalled. The stalled status acts as a lock so
    /// two concurrent reaper passes cannot both recover the same job.
    pub async fn mark_stalled(&self, cluster_id: &str, job_id: &str) -> Result<bool, StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE jobs SET status = 'stalled', updated_at = ?1 \
                 WHERE cluster_id = ?2 AND id = ?3 AND status = 'running'",
                params![now_ts(), cluster_id, job_id],
            )
            .await?;
        Ok(affected == 1)
    }

    /// All currently stalled jobs.
    pub async fn stalled_jobs(&self) -> Result<Vec<StalledJob>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, cluster_id, service, target_fn, remaining_attempts, run_id \
                 FROM jobs WHERE status = 'stalled'",
                (),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(StalledJob {
                id: row.get(0)?,
                cluster_id: row.get(1)?,
                service: row.get(2)?,
                target_fn: row.get(3)?,
                remaining_attempts: row.get(4)?,
                run_id: row.get(5)?,
            });
        }
        Ok(out)
    }

    /// Return a stalled job to pending, consuming one attempt.
    pub async fn recover_stalled(
        &self,
        cluster_id: &str,
        job_id: &str,
    ) -> Result<bool, StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE jobs SET status = 'pending', \
                 remaining_attempts = remaining_attempts - 1, updated_at = ?1 \
                 WHERE cluster_id = ?2 AND id = ?3 AND status = 'stalled' \
                 AND remaining_attempts > 0",
                params![now_ts(), cluster_id, job_id],
            )
            .await?;
        Ok(affected == 1)
    }

    /// Terminally fail a stalled job with no attempts left.
    /// Returns the owning run id when applied.
    pub async fn fail_stalled(
        &self,
        cluster_id: &str,
        job_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "UPDATE jobs SET status = 'failure', updated_at = ?1 \
                 WHERE cluster_id = ?2 AND id = ?3 AND status = 'stalled' \
                 AND remaining_attempts <= 0 \
                 RETURNING run_id",
                params![now_ts(), cluster_id, job_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Jobs blocking a run: pending/running, or awaiting an approval decision.
    pub async fn waiting_job_ids(
        &self,
        cluster_id: &str,
        run_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id FROM jobs WHERE cluster_id = ?1 AND run_id = ?2 \
                 AND (status IN ('pending', 'running') \
                      OR (approval_requested = 1 AND approved IS NULL))",
                params![cluster_id, run_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row.get(0)?);
        }
        Ok(out)
    }

    // ── Machines ────────────────────────────────────────────────────

    /// Record a worker ping, reviving the machine if it was inactive.
    pub async fn upsert_machine_ping(
        &self,
        cluster_id: &str,
        machine_id: &str,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO machines (id, cluster_id, status, last_ping_at) \
                 VALUES (?1, ?2, 'active', ?3) \
                 ON CONFLICT (cluster_id, id) DO UPDATE SET \
                 last_ping_at = excluded.last_ping_at, status = 'active'",
                params![machine_id, cluster_id, now_ts()],
            )
            .await?;
        Ok(())
    }

    /// Deactivate machines that stopped pinging. Returns the affected
    /// `(cluster_id, machine_id)` pairs.
    pub async fn mark_stale_machines(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "UPDATE machines SET status = 'inactive' \
                 WHERE status = 'active' AND last_ping_at < ?1 \
                 RETURNING cluster_id, id",
                params![fmt_ts(cutoff)],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push((row.get(0)?, row.get(1)?));
        }
        Ok(out)
    }

    /// Running jobs claimed by machines that have since gone inactive.
    pub async fn running_jobs_on_inactive_machines(&self) -> Result<Vec<StalledJob>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT j.id, j.cluster_id, j.service, j.target_fn, \
                 j.remaining_attempts, j.run_id \
                 FROM jobs j JOIN machines m \
                 ON j.executing_machine_id = m.id AND j.cluster_id = m.cluster_id \
                 WHERE j.status = 'running' AND m.status = 'inactive' \
                 AND NOT (j.approval_requested = 1 AND j.approved IS NULL)",
                (),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(StalledJob {
                id: row.get(0)?,
                cluster_id: row.get(1)?,
                service: row.get(2)?,
                target_fn: row.get(3)?,
                remaining_attempts: row.get(4)?,
                run_id: row.get(5)?,
            });
        }
        Ok(out)
    }

    /// Backdate a job's last claim (test support for stall scenarios).
    #[cfg(test)]
    pub(crate) async fn backdate_claim(
        &self,
        cluster_id: &str,
        job_id: &str,
        claimed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE jobs SET last_claimed_at = ?1 WHERE cluster_id = ?2 AND id = ?3",
                params![fmt_ts(claimed_at), cluster_id, job_id],
            )
            .await?;
        Ok(())
    }

    /// Backdate a job's result timestamp (test support for cache expiry).
    #[cfg(test)]
    pub(crate) async fn backdate_result(
        &self,
        cluster_id: &str,
        job_id: &str,
        resulted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE jobs SET resulted_at = ?1 WHERE cluster_id = ?2 AND id = ?3",
                params![fmt_ts(resulted_at), cluster_id, job_id],
            )
            .await?;
        Ok(())
    }
}
