//! SurrealDB implementation of [`SimulationRepository`].

use chrono::{DateTime, Utc};
use haccare_core::error::CoreResult;
use haccare_core::models::history::SimulationHistory;
use haccare_core::models::participant::{SimulationParticipant, SimulationRole};
use haccare_core::models::simulation::{ActiveSimulation, SimulationStatus};
use haccare_core::repository::SimulationRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{parse_optional_uuid, parse_uuid};
use crate::error::DbError;

fn parse_status(table: &str, value: &str) -> Result<SimulationStatus, DbError> {
    SimulationStatus::parse(value)
        .ok_or_else(|| DbError::decode(table, format!("unknown status '{value}'")))
}

#[derive(Debug, SurrealValue)]
struct SimulationRowWithId {
    record_id: String,
    tenant_id: String,
    template_id: String,
    name: String,
    status: String,
    duration_minutes: u32,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    template_snapshot_version_synced: u64,
    primary_categories: Vec<String>,
    sub_categories: Vec<String>,
    launched_by: Option<String>,
    first_started_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SimulationRowWithId {
    fn try_into_simulation(self) -> Result<ActiveSimulation, DbError> {
        const TABLE: &str = "active_simulation";
        Ok(ActiveSimulation {
            id: parse_uuid(TABLE, &self.record_id)?,
            tenant_id: parse_uuid(TABLE, &self.tenant_id)?,
            template_id: parse_uuid(TABLE, &self.template_id)?,
            name: self.name,
            status: parse_status(TABLE, &self.status)?,
            duration_minutes: self.duration_minutes,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            template_snapshot_version_synced: self.template_snapshot_version_synced,
            primary_categories: self.primary_categories,
            sub_categories: self.sub_categories,
            launched_by: parse_optional_uuid(TABLE, self.launched_by.as_deref())?,
            first_started_at: self.first_started_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct ParticipantRowWithId {
    record_id: String,
    simulation_id: String,
    user_id: String,
    role: String,
}

impl ParticipantRowWithId {
    fn try_into_participant(self) -> Result<SimulationParticipant, DbError> {
        const TABLE: &str = "simulation_participant";
        let role = SimulationRole::parse(&self.role)
            .ok_or_else(|| DbError::decode(TABLE, format!("unknown role '{}'", self.role)))?;
        Ok(SimulationParticipant {
            id: parse_uuid(TABLE, &self.record_id)?,
            simulation_id: parse_uuid(TABLE, &self.simulation_id)?,
            user_id: parse_uuid(TABLE, &self.user_id)?,
            role,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct HistoryRowWithId {
    record_id: String,
    simulation_id: String,
    template_id: String,
    name: String,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    duration_minutes: u32,
    primary_categories: Vec<String>,
    sub_categories: Vec<String>,
    final_status: String,
    participant_count: u32,
    archived_at: DateTime<Utc>,
}

impl HistoryRowWithId {
    fn try_into_history(self) -> Result<SimulationHistory, DbError> {
        const TABLE: &str = "simulation_history";
        Ok(SimulationHistory {
            id: parse_uuid(TABLE, &self.record_id)?,
            simulation_id: parse_uuid(TABLE, &self.simulation_id)?,
            template_id: parse_uuid(TABLE, &self.template_id)?,
            name: self.name,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_minutes: self.duration_minutes,
            primary_categories: self.primary_categories,
            sub_categories: self.sub_categories,
            final_status: parse_status(TABLE, &self.final_status)?,
            participant_count: self.participant_count,
            archived_at: self.archived_at,
        })
    }
}

/// SurrealDB implementation of the Simulation repository.
///
/// Writes go through [`SurrealChangeSetWriter`](super::SurrealChangeSetWriter).
#[derive(Clone)]
pub struct SurrealSimulationRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSimulationRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SimulationRepository for SurrealSimulationRepository<C> {
    async fn get_by_id(&self, id: Uuid) -> CoreResult<ActiveSimulation> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('active_simulation', $id)",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SimulationRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "simulation".into(),
            id: id_str,
        })?;

        Ok(row.try_into_simulation()?)
    }

    async fn list(&self) -> CoreResult<Vec<ActiveSimulation>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM active_simulation \
                 ORDER BY created_at ASC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SimulationRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|r| r.try_into_simulation().map_err(Into::into))
            .collect()
    }

    async fn list_participants(&self, simulation_id: Uuid) -> CoreResult<Vec<SimulationParticipant>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM simulation_participant \
                 WHERE simulation_id = $simulation_id",
            )
            .bind(("simulation_id", simulation_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ParticipantRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|r| r.try_into_participant().map_err(Into::into))
            .collect()
    }

    async fn list_history(&self, template_id: Uuid) -> CoreResult<Vec<SimulationHistory>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM simulation_history \
                 WHERE template_id = $template_id \
                 ORDER BY archived_at ASC",
            )
            .bind(("template_id", template_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<HistoryRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|r| r.try_into_history().map_err(Into::into))
            .collect()
    }
}
