//! Simulation template domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
    /// No snapshot has been captured yet.
    Draft,
    /// A snapshot exists and the template can be launched.
    Ready,
}

impl TemplateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateStatus::Draft => "draft",
            TemplateStatus::Ready => "ready",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(TemplateStatus::Draft),
            "ready" => Some(TemplateStatus::Ready),
            _ => None,
        }
    }
}

/// An instructor-authored dataset that simulations are launched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationTemplate {
    pub id: Uuid,
    /// The authoring tenant whose data is captured into snapshots.
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: TemplateStatus,
    pub snapshot: Option<Snapshot>,
    /// Only ever increases.
    pub snapshot_version: u64,
    pub default_duration_minutes: u32,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTemplate {
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub default_duration_minutes: u32,
    pub created_by: Option<Uuid>,
}

impl SimulationTemplate {
    /// A draft template with a fresh id and no snapshot. Written as part
    /// of the change set that also creates its tenant.
    pub fn new(input: CreateTemplate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            name: input.name,
            description: input.description,
            status: TemplateStatus::Draft,
            snapshot: None,
            snapshot_version: 0,
            default_duration_minutes: input.default_duration_minutes,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        }
    }
}
