//! Durable storage — libSQL-backed tables for jobs, runs, messages,
//! service definitions, machines, events, blobs, and named locks.
//!
//! The job row is the single source of truth for dispatch coordination:
//! every claim, approval, and retry is a conditional row-scoped update, so
//! arbitrarily many dispatcher processes can share one database safely.

mod blobs;
mod events;
mod jobs;
mod libsql;
mod locks;
mod messages;
mod runs;
mod services;

pub use blobs::Blob;
pub use events::EventRow;
pub use jobs::{ClaimedJob, Job, JobInsert, JobStatus, ResultKind, StalledJob};
pub use self::libsql::LibSqlStore;
pub use messages::{Invocation, Message, MessageData};
pub use runs::{Run, RunInsert, RunStatus};
pub use services::{CacheConfig, FunctionConfig, FunctionDefinition, ServiceDefinition};

use chrono::{DateTime, SecondsFormat, Utc};

/// Canonical timestamp format for every datetime column.
///
/// Fixed-width UTC millis so that string comparison in SQL agrees with
/// chronological ordering.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn now_ts() -> String {
    fmt_ts(Utc::now())
}

/// Parse a stored timestamp back into `DateTime<Utc>`.
pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
}

pub(crate) fn parse_opt_ts(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_ts(s))
}
