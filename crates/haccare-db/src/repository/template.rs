//! SurrealDB implementation of [`TemplateRepository`].

use chrono::{DateTime, Utc};
use haccare_core::error::CoreResult;
use haccare_core::models::snapshot::Snapshot;
use haccare_core::models::template::{SimulationTemplate, TemplateStatus};
use haccare_core::repository::TemplateRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{parse_optional_uuid, parse_uuid};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct TemplateRowWithId {
    record_id: String,
    tenant_id: String,
    name: String,
    description: Option<String>,
    status: String,
    snapshot: Option<serde_json::Value>,
    snapshot_version: u64,
    default_duration_minutes: u32,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TemplateRowWithId {
    fn try_into_template(self) -> Result<SimulationTemplate, DbError> {
        let status = TemplateStatus::parse(&self.status).ok_or_else(|| {
            DbError::decode("template", format!("unknown status '{}'", self.status))
        })?;
        let snapshot = self
            .snapshot
            .map(serde_json::from_value::<Snapshot>)
            .transpose()
            .map_err(|e| DbError::decode("template", format!("corrupt snapshot: {e}")))?;
        Ok(SimulationTemplate {
            id: parse_uuid("template", &self.record_id)?,
            tenant_id: parse_uuid("template", &self.tenant_id)?,
            name: self.name,
            description: self.description,
            status,
            snapshot,
            snapshot_version: self.snapshot_version,
            default_duration_minutes: self.default_duration_minutes,
            created_by: parse_optional_uuid("template", self.created_by.as_deref())?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Template repository.
#[derive(Clone)]
pub struct SurrealTemplateRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTemplateRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> TemplateRepository for SurrealTemplateRepository<C> {
    async fn get_by_id(&self, id: Uuid) -> CoreResult<SimulationTemplate> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('template', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TemplateRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "template".into(),
            id: id_str,
        })?;

        Ok(row.try_into_template()?)
    }
}
