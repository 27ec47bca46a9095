//! Archived simulation summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::simulation::{ActiveSimulation, SimulationStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationHistory {
    pub id: Uuid,
    pub simulation_id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub primary_categories: Vec<String>,
    pub sub_categories: Vec<String>,
    /// Status the simulation was in when it was archived.
    pub final_status: SimulationStatus,
    pub participant_count: u32,
    pub archived_at: DateTime<Utc>,
}

impl SimulationHistory {
    pub fn from_simulation(
        sim: &ActiveSimulation,
        participant_count: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            simulation_id: sim.id,
            template_id: sim.template_id,
            name: sim.name.clone(),
            started_at: sim.first_started_at.unwrap_or(sim.starts_at),
            ended_at: sim.ends_at.min(now),
            duration_minutes: sim.duration_minutes,
            primary_categories: sim.primary_categories.clone(),
            sub_categories: sim.sub_categories.clone(),
            final_status: sim.status,
            participant_count,
            archived_at: now,
        }
    }
}
