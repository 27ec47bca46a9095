//! Tenant-level access grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role a user holds inside a tenant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessRole {
    /// Elevated access: may edit orders, reset and manage the simulation.
    Admin,
    /// Standard clinical access.
    Nurse,
    Viewer,
}

impl AccessRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRole::Admin => "admin",
            AccessRole::Nurse => "nurse",
            AccessRole::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(AccessRole::Admin),
            "nurse" => Some(AccessRole::Nurse),
            "viewer" => Some(AccessRole::Viewer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantAccess {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role: AccessRole,
    pub granted_at: DateTime<Utc>,
}
