//! SurrealDB implementation of [`AccessRepository`].

use chrono::{DateTime, Utc};
use haccare_core::error::CoreResult;
use haccare_core::models::access::{AccessRole, TenantAccess};
use haccare_core::repository::AccessRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AccessRowWithId {
    record_id: String,
    tenant_id: String,
    user_id: String,
    role: String,
    granted_at: DateTime<Utc>,
}

impl AccessRowWithId {
    fn try_into_access(self) -> Result<TenantAccess, DbError> {
        let role = AccessRole::parse(&self.role).ok_or_else(|| {
            DbError::decode("tenant_access", format!("unknown role '{}'", self.role))
        })?;
        Ok(TenantAccess {
            id: parse_uuid("tenant_access", &self.record_id)?,
            tenant_id: parse_uuid("tenant_access", &self.tenant_id)?,
            user_id: parse_uuid("tenant_access", &self.user_id)?,
            role,
            granted_at: self.granted_at,
        })
    }
}

#[derive(Clone)]
pub struct SurrealAccessRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAccessRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn list_where(&self, column: &'static str, value: Uuid) -> CoreResult<Vec<TenantAccess>> {
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM tenant_access \
             WHERE {column} = $value ORDER BY granted_at ASC"
        );
        let mut result = self
            .db
            .query(query)
            .bind(("value", value.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AccessRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|r| r.try_into_access().map_err(Into::into))
            .collect()
    }
}

impl<C: Connection> AccessRepository for SurrealAccessRepository<C> {
    async fn list_for_tenant(&self, tenant_id: Uuid) -> CoreResult<Vec<TenantAccess>> {
        self.list_where("tenant_id", tenant_id).await
    }

    async fn list_for_user(&self, user_id: Uuid) -> CoreResult<Vec<TenantAccess>> {
        self.list_where("user_id", user_id).await
    }
}
