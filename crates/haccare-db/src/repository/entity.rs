//! SurrealDB implementation of [`EntityRepository`].
//!
//! Every patient-care kind lives in its own table with the same layout:
//! indexed `tenant_id` / `patient_id` columns and a FLEXIBLE `record`
//! object holding the coerced fields.

use haccare_core::error::CoreResult;
use haccare_core::models::entity::EntityRecord;
use haccare_core::registry::EntityKind;
use haccare_core::repository::EntityRepository;
use serde_json::Value;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct EntityRowWithId {
    record_id: String,
    tenant_id: String,
    record: serde_json::Value,
}

impl EntityRowWithId {
    fn try_into_record(self, kind: EntityKind) -> Result<EntityRecord, DbError> {
        let table = kind.table();
        let fields = match self.record {
            Value::Object(fields) => fields,
            Value::Null => Default::default(),
            other => {
                return Err(DbError::decode(
                    table,
                    format!("record column is not an object: {other}"),
                ));
            }
        };
        Ok(EntityRecord {
            id: parse_uuid(table, &self.record_id)?,
            tenant_id: parse_uuid(table, &self.tenant_id)?,
            kind,
            fields,
        })
    }
}

/// Rows of a tenant: those stamped with `tenant_id` plus those owned by
/// one of its patients. `tenant` is the SurrealQL expression holding the
/// tenant id.
pub(crate) fn owned_by_tenant(tenant: &str) -> String {
    format!(
        "tenant_id = {tenant} OR patient_id IN \
         (SELECT VALUE meta::id(id) FROM {patients} WHERE tenant_id = {tenant})",
        patients = EntityKind::Patient.table()
    )
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

#[derive(Clone)]
pub struct SurrealEntityRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealEntityRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> EntityRepository for SurrealEntityRepository<C> {
    async fn list(&self, tenant_id: Uuid, kind: EntityKind) -> CoreResult<Vec<EntityRecord>> {
        // Table names come from the registry, never from input.
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM {} \
             WHERE tenant_id = $tenant_id ORDER BY created_at ASC, record_id ASC",
            kind.table()
        );

        let mut result = self
            .db
            .query(query)
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<EntityRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|r| r.try_into_record(kind).map_err(Into::into))
            .collect()
    }

    async fn count(&self, tenant_id: Uuid, kind: EntityKind) -> CoreResult<u64> {
        let query = format!(
            "SELECT count() AS total FROM {} \
             WHERE tenant_id = $tenant_id GROUP ALL",
            kind.table()
        );
        self.count_where(query, tenant_id).await
    }

    async fn count_owned(&self, tenant_id: Uuid, kind: EntityKind) -> CoreResult<u64> {
        let query = format!(
            "SELECT count() AS total FROM {} WHERE {} GROUP ALL",
            kind.table(),
            owned_by_tenant("$tenant_id")
        );
        self.count_where(query, tenant_id).await
    }
}

impl<C: Connection> SurrealEntityRepository<C> {
    async fn count_where(&self, query: String, tenant_id: Uuid) -> CoreResult<u64> {
        let mut result = self
            .db
            .query(query)
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}
