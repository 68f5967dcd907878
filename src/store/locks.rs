//! Named advisory locks with a lease expiry.
//!
//! Used by the stall reaper so that only one process sweeps at a time, and
//! by the run queue consumer to serialize processing per run. A crashed
//! holder's lock frees itself when the lease expires.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use libsql::params;

use super::{LibSqlStore, fmt_ts, now_ts};
use crate::error::StoreError;

impl LibSqlStore {
    /// Try to take a named lock for `lease`. Succeeds if the lock is free,
    /// expired, or already held by this holder (re-entrant refresh).
    pub async fn try_acquire_lock(
        &self,
        name: &str,
        holder: &str,
        lease: Duration,
    ) -> Result<bool, StoreError> {
        let now = now_ts();
        let expires = fmt_ts(Utc::now() + ChronoDuration::from_std(lease).unwrap_or_default());
        let affected = self
            .conn()
            .execute(
                "INSERT INTO locks (name, holder, expires_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (name) DO UPDATE SET \
                 holder = excluded.holder, expires_at = excluded.expires_at \
                 WHERE locks.expires_at < ?4 OR locks.holder = excluded.holder",
                params![name, holder, expires, now],
            )
            .await?;
        Ok(affected == 1)
    }

    /// Release a lock if still held by `holder`.
    pub async fn release_lock(&self, name: &str, holder: &str) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "DELETE FROM locks WHERE name = ?1 AND holder = ?2",
                params![name, holder],
            )
            .await?;
        Ok(())
    }
}
