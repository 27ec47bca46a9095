//! SurrealDB implementation of [`AuditRepository`].
//!
//! Entries are append-only and only ever written through a change set.

use chrono::{DateTime, Utc};
use haccare_core::error::CoreResult;
use haccare_core::models::audit::{AuditLogEntry, AuditOutcome};
use haccare_core::repository::AuditRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{parse_optional_uuid, parse_uuid};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AuditRowWithId {
    record_id: String,
    actor_id: Option<String>,
    action: String,
    simulation_id: Option<String>,
    tenant_id: Option<String>,
    outcome: String,
    metadata: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl AuditRowWithId {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        let outcome = AuditOutcome::parse(&self.outcome).ok_or_else(|| {
            DbError::decode("audit_log", format!("unknown outcome '{}'", self.outcome))
        })?;
        Ok(AuditLogEntry {
            id: parse_uuid("audit_log", &self.record_id)?,
            actor_id: parse_optional_uuid("audit_log", self.actor_id.as_deref())?,
            action: self.action,
            simulation_id: parse_optional_uuid("audit_log", self.simulation_id.as_deref())?,
            tenant_id: parse_optional_uuid("audit_log", self.tenant_id.as_deref())?,
            outcome,
            metadata: self.metadata,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Clone)]
pub struct SurrealAuditRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditRepository for SurrealAuditRepository<C> {
    async fn list_for_simulation(&self, simulation_id: Uuid) -> CoreResult<Vec<AuditLogEntry>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM audit_log \
                 WHERE simulation_id = $simulation_id \
                 ORDER BY timestamp ASC",
            )
            .bind(("simulation_id", simulation_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AuditRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|r| r.try_into_entry().map_err(Into::into))
            .collect()
    }
}
