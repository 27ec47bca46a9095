//! Simulation participants and their roles.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::access::AccessRole;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimulationRole {
    Instructor,
    Student,
    Observer,
}

impl SimulationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationRole::Instructor => "instructor",
            SimulationRole::Student => "student",
            SimulationRole::Observer => "observer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instructor" => Some(SimulationRole::Instructor),
            "student" => Some(SimulationRole::Student),
            "observer" => Some(SimulationRole::Observer),
            _ => None,
        }
    }

    /// The tenant-level access a participant receives for this role.
    pub fn access_role(&self) -> AccessRole {
        match self {
            SimulationRole::Instructor => AccessRole::Admin,
            SimulationRole::Student => AccessRole::Nurse,
            SimulationRole::Observer => AccessRole::Viewer,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParticipant {
    pub id: Uuid,
    pub simulation_id: Uuid,
    pub user_id: Uuid,
    pub role: SimulationRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_map_to_tenant_access() {
        assert_eq!(SimulationRole::Instructor.access_role(), AccessRole::Admin);
        assert_eq!(SimulationRole::Student.access_role(), AccessRole::Nurse);
        assert_eq!(SimulationRole::Observer.access_role(), AccessRole::Viewer);
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!(
            SimulationRole::parse(" Instructor "),
            Some(SimulationRole::Instructor)
        );
        assert_eq!(SimulationRole::parse("janitor"), None);
    }
}
