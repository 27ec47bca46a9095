//! Audit log domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(AuditOutcome::Success),
            "failure" => Some(AuditOutcome::Failure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub simulation_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub outcome: AuditOutcome,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn success(action: &str, actor_id: Option<Uuid>, metadata: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id,
            action: action.into(),
            simulation_id: None,
            tenant_id: None,
            outcome: AuditOutcome::Success,
            metadata,
            timestamp: Utc::now(),
        }
    }

    pub fn for_simulation(mut self, simulation_id: Uuid, tenant_id: Uuid) -> Self {
        self.simulation_id = Some(simulation_id);
        self.tenant_id = Some(tenant_id);
        self
    }
}
