//! SurrealDB implementation of [`TenantRepository`].

use chrono::{DateTime, Utc};
use haccare_core::error::CoreResult;
use haccare_core::models::tenant::{CreateTenant, Tenant, TenantType};
use haccare_core::repository::TenantRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{parse_optional_uuid, parse_uuid};
use crate::error::DbError;

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct TenantRowWithId {
    record_id: String,
    name: String,
    tenant_type: String,
    is_simulation: bool,
    parent_tenant_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TenantRowWithId {
    fn try_into_tenant(self) -> Result<Tenant, DbError> {
        let tenant_type = TenantType::parse(&self.tenant_type).ok_or_else(|| {
            DbError::decode("tenant", format!("unknown tenant type '{}'", self.tenant_type))
        })?;
        Ok(Tenant {
            id: parse_uuid("tenant", &self.record_id)?,
            name: self.name,
            tenant_type,
            is_simulation: self.is_simulation,
            parent_tenant_id: parse_optional_uuid("tenant", self.parent_tenant_id.as_deref())?,
            created_at: self.created_at,
        })
    }
}

/// SurrealDB implementation of the Tenant repository.
#[derive(Clone)]
pub struct SurrealTenantRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTenantRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> TenantRepository for SurrealTenantRepository<C> {
    async fn create(&self, input: CreateTenant) -> CoreResult<Tenant> {
        let tenant = Tenant::new(input);
        let id_str = tenant.id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('tenant', $id) SET \
                 name = $name, \
                 tenant_type = $tenant_type, \
                 is_simulation = $is_simulation, \
                 parent_tenant_id = $parent_tenant_id, \
                 created_at = $created_at",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", tenant.name.clone()))
            .bind(("tenant_type", tenant.tenant_type.as_str()))
            .bind(("is_simulation", tenant.is_simulation))
            .bind((
                "parent_tenant_id",
                tenant.parent_tenant_id.map(|id| id.to_string()),
            ))
            .bind(("created_at", tenant.created_at))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        Ok(tenant)
    }

    async fn get_by_id(&self, id: Uuid) -> CoreResult<Tenant> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('tenant', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "tenant".into(),
            id: id_str,
        })?;

        Ok(row.try_into_tenant()?)
    }

    async fn list_children(&self, parent_id: Uuid) -> CoreResult<Vec<Tenant>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM tenant \
                 WHERE parent_tenant_id = $parent_id \
                 ORDER BY created_at ASC",
            )
            .bind(("parent_id", parent_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|r| r.try_into_tenant().map_err(Into::into))
            .collect()
    }
}
