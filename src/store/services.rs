//! Service definition rows.
//!
//! Workers re-register their service definition on every poll; each
//! registration refreshes an expiry window, so a service that stops polling
//! disappears from the catalogue on its own.

use chrono::{Duration as ChronoDuration, Utc};
use libsql::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{LibSqlStore, fmt_ts, now_ts};
use crate::error::StoreError;

/// Result caching policy for a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Dot path into the arguments that yields the cache key.
    pub key_path: String,
    pub ttl_seconds: u32,
}

/// Per-function execution policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count_on_stall: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    #[serde(default)]
    pub requires_approval: bool,
    /// Private functions are not exposed to agent runs.
    #[serde(default)]
    pub private: bool,
}

/// A single registered function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for the function's input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<FunctionConfig>,
}

/// A worker-registered service and its functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub service: String,
    #[serde(default)]
    pub functions: Vec<FunctionDefinition>,
}

impl ServiceDefinition {
    pub fn function(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions.iter().find(|f| f.name == name)
    }
}

impl LibSqlStore {
    /// Register or refresh a service definition with the given ttl.
    pub async fn upsert_service_definition(
        &self,
        cluster_id: &str,
        definition: &ServiceDefinition,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        let expires = fmt_ts(Utc::now() + ChronoDuration::seconds(ttl_seconds as i64));
        self.conn()
            .execute(
                "INSERT INTO services (cluster_id, service, definition, expires_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT (cluster_id, service) DO UPDATE SET \
                 definition = excluded.definition, expires_at = excluded.expires_at, \
                 updated_at = excluded.updated_at",
                params![
                    cluster_id,
                    definition.service.as_str(),
                    serde_json::to_string(definition)?,
                    expires,
                    now_ts(),
                ],
            )
            .await?;
        Ok(())
    }

    /// Fetch a service definition, treating expired registrations as absent.
    pub async fn get_service_definition(
        &self,
        cluster_id: &str,
        service: &str,
    ) -> Result<Option<ServiceDefinition>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT definition FROM services \
                 WHERE cluster_id = ?1 AND service = ?2 AND expires_at > ?3",
                params![cluster_id, service, now_ts()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => {
                let raw: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    /// All live service definitions for a cluster.
    pub async fn list_service_definitions(
        &self,
        cluster_id: &str,
    ) -> Result<Vec<ServiceDefinition>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT definition FROM services \
                 WHERE cluster_id = ?1 AND expires_at > ?2 ORDER BY service",
                params![cluster_id, now_ts()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            let raw: String = row.get(0)?;
            out.push(serde_json::from_str(&raw)?);
        }
        Ok(out)
    }
}
