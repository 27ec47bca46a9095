//! Active simulation domain model and its lifecycle state machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    Launching,
    Lobby,
    Running,
    Paused,
    Completed,
    /// Terminal.
    Deleted,
}

impl SimulationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationStatus::Launching => "launching",
            SimulationStatus::Lobby => "lobby",
            SimulationStatus::Running => "running",
            SimulationStatus::Paused => "paused",
            SimulationStatus::Completed => "completed",
            SimulationStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "launching" => Some(SimulationStatus::Launching),
            "lobby" => Some(SimulationStatus::Lobby),
            "running" => Some(SimulationStatus::Running),
            "paused" => Some(SimulationStatus::Paused),
            "completed" => Some(SimulationStatus::Completed),
            "deleted" => Some(SimulationStatus::Deleted),
            _ => None,
        }
    }

    /// Whether `self -> next` is a legal lifecycle move.
    ///
    /// Resets move any non-terminal, launched simulation back to the lobby,
    /// so `Running | Paused | Completed -> Lobby` is allowed.
    pub fn can_transition_to(&self, next: SimulationStatus) -> bool {
        use SimulationStatus::*;
        matches!(
            (self, next),
            (Launching, Lobby)
                | (Lobby, Running)
                | (Lobby, Lobby)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Paused, Completed)
                | (Running, Lobby)
                | (Paused, Lobby)
                | (Completed, Lobby)
                | (Launching, Deleted)
                | (Lobby, Deleted)
                | (Running, Deleted)
                | (Paused, Deleted)
                | (Completed, Deleted)
        )
    }

    pub fn has_started(&self) -> bool {
        matches!(
            self,
            SimulationStatus::Running | SimulationStatus::Paused | SimulationStatus::Completed
        )
    }
}

/// A live, timed instance of a template running in its own tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSimulation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub status: SimulationStatus,
    pub duration_minutes: u32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Template snapshot version this simulation was last restored from.
    pub template_snapshot_version_synced: u64,
    pub primary_categories: Vec<String>,
    pub sub_categories: Vec<String>,
    pub launched_by: Option<Uuid>,
    /// Set the first time the simulation moves to `Running`.
    pub first_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActiveSimulation {
    pub fn transition(&mut self, next: SimulationStatus, now: DateTime<Utc>) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::invalid_state(format!(
                "simulation {} cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        if next == SimulationStatus::Running && self.first_started_at.is_none() {
            self.first_started_at = Some(now);
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Restart the timer window from `now` using the configured duration.
    pub fn restart_timer(&mut self, now: DateTime<Utc>) {
        self.starts_at = now;
        self.ends_at = now + Duration::minutes(i64::from(self.duration_minutes));
        self.updated_at = now;
    }

    pub fn has_started(&self) -> bool {
        self.first_started_at.is_some() || self.status.has_started()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            SimulationStatus::Running | SimulationStatus::Paused
        ) && self.ends_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim(status: SimulationStatus) -> ActiveSimulation {
        let now = Utc::now();
        ActiveSimulation {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            name: "Sepsis drill".into(),
            status,
            duration_minutes: 60,
            starts_at: now,
            ends_at: now + Duration::minutes(60),
            template_snapshot_version_synced: 1,
            primary_categories: vec![],
            sub_categories: vec![],
            launched_by: None,
            first_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn happy_path_transitions() {
        let now = Utc::now();
        let mut s = sim(SimulationStatus::Launching);
        s.transition(SimulationStatus::Lobby, now).unwrap();
        s.transition(SimulationStatus::Running, now).unwrap();
        assert_eq!(s.first_started_at, Some(now));
        s.transition(SimulationStatus::Paused, now).unwrap();
        s.transition(SimulationStatus::Running, now).unwrap();
        s.transition(SimulationStatus::Completed, now).unwrap();
        s.transition(SimulationStatus::Deleted, now).unwrap();
    }

    #[test]
    fn deleted_is_terminal() {
        let mut s = sim(SimulationStatus::Deleted);
        for next in [
            SimulationStatus::Lobby,
            SimulationStatus::Running,
            SimulationStatus::Completed,
        ] {
            assert!(s.transition(next, Utc::now()).is_err());
        }
    }

    #[test]
    fn cannot_pause_from_lobby() {
        let mut s = sim(SimulationStatus::Lobby);
        let err = s.transition(SimulationStatus::Paused, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }

    #[test]
    fn first_start_time_is_kept_on_resume() {
        let t0 = Utc::now();
        let mut s = sim(SimulationStatus::Lobby);
        s.transition(SimulationStatus::Running, t0).unwrap();
        s.transition(SimulationStatus::Paused, t0).unwrap();
        s.transition(SimulationStatus::Running, t0 + Duration::minutes(5))
            .unwrap();
        assert_eq!(s.first_started_at, Some(t0));
    }

    #[test]
    fn expiry_only_applies_to_running_or_paused() {
        let mut s = sim(SimulationStatus::Running);
        let later = s.ends_at + Duration::seconds(1);
        assert!(s.is_expired(later));
        s.status = SimulationStatus::Lobby;
        assert!(!s.is_expired(later));
    }

    #[test]
    fn restart_timer_uses_duration() {
        let mut s = sim(SimulationStatus::Running);
        let now = Utc::now() + Duration::hours(3);
        s.restart_timer(now);
        assert_eq!(s.starts_at, now);
        assert_eq!(s.ends_at - s.starts_at, Duration::minutes(60));
    }
}
