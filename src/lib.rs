//! Foreman — multi-tenant job dispatch and agent run orchestration.
//!
//! Worker machines long-poll for jobs, execute them, and report results;
//! agent runs step a reasoning model against registered tools, dispatching
//! tool calls as jobs. A stall reaper recovers work lost to crashed
//! workers. All coordination state lives in a libSQL database, so any
//! number of processes can share one deployment safely.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod model;
pub mod runs;
pub mod schema;
pub mod store;
pub mod tools;

pub use config::Config;
pub use error::{Error, Result};
