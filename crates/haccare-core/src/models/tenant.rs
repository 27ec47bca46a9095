//! Tenant domain model.
//!
//! Tenants provide full data isolation. Every patient-care entity carries
//! the id of the tenant it belongs to. Simulation tenants hang off a home
//! tenant via `parent_tenant_id` and may own child tenants of their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TenantType {
    /// An institution's regular home tenant.
    Standard,
    /// Authoring tenant behind a simulation template.
    Template,
    /// A live, disposable simulation tenant.
    SimulationActive,
}

impl TenantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantType::Standard => "standard",
            TenantType::Template => "template",
            TenantType::SimulationActive => "simulation_active",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(TenantType::Standard),
            "template" => Some(TenantType::Template),
            "simulation_active" => Some(TenantType::SimulationActive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub tenant_type: TenantType,
    pub is_simulation: bool,
    /// Owning tenant. A child must be deleted before its parent.
    pub parent_tenant_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub tenant_type: TenantType,
    pub parent_tenant_id: Option<Uuid>,
}

impl Tenant {
    /// Build a new tenant value with a fresh id. Used when the tenant row
    /// is written as part of a larger change set.
    pub fn new(input: CreateTenant) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            is_simulation: input.tenant_type == TenantType::SimulationActive,
            tenant_type: input.tenant_type,
            parent_tenant_id: input.parent_tenant_id,
            created_at: Utc::now(),
        }
    }
}
