//! Lifecycle engine error types.

use haccare_core::error::CoreError;
use haccare_core::id_map::DuplicateOldId;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("template {template_id} is not ready for launch")]
    TemplateNotReady { template_id: Uuid },

    #[error("template {template_id} has no snapshot")]
    MissingSnapshot { template_id: Uuid },

    #[error("unsupported snapshot format version {found} (supported: {supported})")]
    UnsupportedSnapshotFormat { found: u32, supported: u32 },

    #[error("patient set diverged from template: {0}")]
    PatientSetDiverged(String),

    #[error("duration must be between 1 and {max} minutes, got {minutes}")]
    InvalidDuration { minutes: u32, max: u32 },

    #[error("no parent tenant available for the launching user")]
    NoParentTenant,

    #[error("{users} participant ids but {roles} participant roles")]
    ParticipantMismatch { users: usize, roles: usize },

    #[error("unknown participant role '{0}'")]
    UnknownRole(String),

    #[error("user {0} is listed as a participant more than once")]
    DuplicateParticipant(Uuid),

    #[error("simulation {simulation_id} cannot {action} while {status}")]
    WrongStatus {
        simulation_id: Uuid,
        action: &'static str,
        status: &'static str,
    },

    #[error("identifier map collision for {} {}", .0.kind, .0.old_id)]
    IdentifierCollision(DuplicateOldId),
}

impl From<LifecycleError> for CoreError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::TemplateNotReady { .. }
            | LifecycleError::MissingSnapshot { .. }
            | LifecycleError::WrongStatus { .. } => CoreError::InvalidState {
                message: err.to_string(),
            },
            LifecycleError::PatientSetDiverged(reason) => CoreError::RelaunchRequired { reason },
            LifecycleError::UnsupportedSnapshotFormat { .. }
            | LifecycleError::InvalidDuration { .. }
            | LifecycleError::NoParentTenant
            | LifecycleError::ParticipantMismatch { .. }
            | LifecycleError::UnknownRole(_)
            | LifecycleError::DuplicateParticipant(_) => CoreError::Validation {
                message: err.to_string(),
            },
            LifecycleError::IdentifierCollision(_) => CoreError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haccare_core::error::ErrorCode;

    #[test]
    fn divergence_maps_to_relaunch_required() {
        let err: CoreError = LifecycleError::PatientSetDiverged("missing patient".into()).into();
        assert_eq!(err.code(), ErrorCode::RelaunchRequired);
    }

    #[test]
    fn readiness_maps_to_invalid_state() {
        let err: CoreError = LifecycleError::MissingSnapshot {
            template_id: Uuid::new_v4(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::InvalidState);
    }
}
