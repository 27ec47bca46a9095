//! RPC-style entrypoints wrapping the lifecycle manager.
//!
//! Every call returns an [`ApiResponse`]: `{"success": true, ...payload}`
//! on success, `{"success": false, "error", "errorCode"}` otherwise.
//! Callers never see a raw error.

use std::collections::BTreeMap;

use haccare_core::error::{CoreResult, ErrorCode};
use haccare_core::models::participant::SimulationRole;
use haccare_core::registry::EntityKind;
use haccare_core::repository::Repositories;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::manager::{Actor, Comparison, LaunchRequest, ParticipantSpec, SimulationLifecycleManager};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }

    fn from_result(operation: &'static str, result: CoreResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => {
                let code = err.code();
                warn!(operation, error = %err, code = ?code, "Lifecycle call failed");
                Self {
                    success: false,
                    data: None,
                    error: Some(err.to_string()),
                    error_code: Some(code),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotRequest {
    pub template_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSimulationRequest {
    pub template_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub participant_user_ids: Vec<Uuid>,
    /// Parallel to `participant_user_ids`.
    #[serde(default)]
    pub participant_roles: Vec<String>,
    #[serde(default)]
    pub primary_categories: Vec<String>,
    #[serde(default)]
    pub sub_categories: Vec<String>,
}

impl LaunchSimulationRequest {
    fn participants(&self) -> Result<Vec<ParticipantSpec>, LifecycleError> {
        if self.participant_user_ids.len() != self.participant_roles.len() {
            return Err(LifecycleError::ParticipantMismatch {
                users: self.participant_user_ids.len(),
                roles: self.participant_roles.len(),
            });
        }
        self.participant_user_ids
            .iter()
            .zip(&self.participant_roles)
            .map(|(user_id, role)| {
                let role = SimulationRole::parse(role)
                    .ok_or_else(|| LifecycleError::UnknownRole(role.clone()))?;
                Ok(ParticipantSpec {
                    user_id: *user_id,
                    role,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    pub simulation_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSimulationRequest {
    pub simulation_id: Uuid,
    #[serde(default)]
    pub archive_to_history: bool,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotResponse {
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSimulationResponse {
    pub simulation_id: Uuid,
    pub tenant_id: Uuid,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResetSimulationResponse {
    /// Inserted rows keyed by snapshot array name.
    pub restored_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncSimulationResponse {
    pub template_version_synced: u64,
    pub medications_added: usize,
    pub medications_removed: usize,
    pub medication_labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSimulationResponse {
    pub deleted_patients: u64,
    pub deleted_medications: u64,
    pub tenant_id: Uuid,
    pub archived: bool,
}

// ---------------------------------------------------------------------------
// Entrypoints
// ---------------------------------------------------------------------------

pub struct LifecycleApi<R: Repositories> {
    manager: SimulationLifecycleManager<R>,
}

impl<R: Repositories> LifecycleApi<R> {
    pub fn new(manager: SimulationLifecycleManager<R>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &SimulationLifecycleManager<R> {
        &self.manager
    }

    pub async fn create_snapshot(
        &self,
        actor: &Actor,
        request: CreateSnapshotRequest,
    ) -> ApiResponse<CreateSnapshotResponse> {
        let result = self
            .manager
            .create_snapshot(actor, request.template_id)
            .await
            .map(|outcome| CreateSnapshotResponse {
                version: outcome.version,
            });
        ApiResponse::from_result("createSnapshot", result)
    }

    pub async fn launch_simulation(
        &self,
        actor: &Actor,
        request: LaunchSimulationRequest,
    ) -> ApiResponse<LaunchSimulationResponse> {
        let result = self.launch(actor, request).await;
        ApiResponse::from_result("launchSimulation", result)
    }

    async fn launch(
        &self,
        actor: &Actor,
        request: LaunchSimulationRequest,
    ) -> CoreResult<LaunchSimulationResponse> {
        let participants = request.participants()?;
        let outcome = self
            .manager
            .launch(
                actor,
                LaunchRequest {
                    template_id: request.template_id,
                    name: request.name,
                    duration_minutes: request.duration_minutes,
                    participants,
                    primary_categories: request.primary_categories,
                    sub_categories: request.sub_categories,
                },
            )
            .await?;
        Ok(LaunchSimulationResponse {
            simulation_id: outcome.simulation.id,
            tenant_id: outcome.simulation.tenant_id,
        })
    }

    pub async fn reset_simulation(
        &self,
        actor: &Actor,
        request: SimulationRequest,
    ) -> ApiResponse<ResetSimulationResponse> {
        let result = self
            .manager
            .reset(actor, request.simulation_id)
            .await
            .map(|outcome| ResetSimulationResponse {
                restored_counts: outcome.report.inserted_counts(),
            });
        ApiResponse::from_result("resetSimulation", result)
    }

    pub async fn reset_simulation_with_template_sync(
        &self,
        actor: &Actor,
        request: SimulationRequest,
    ) -> ApiResponse<SyncSimulationResponse> {
        let result = self
            .manager
            .reset_with_sync(actor, request.simulation_id)
            .await
            .map(|outcome| SyncSimulationResponse {
                template_version_synced: outcome.template_version_synced,
                medications_added: outcome.medications_added,
                medications_removed: outcome.medications_removed,
                medication_labels: outcome.medication_labels,
            });
        ApiResponse::from_result("resetSimulationWithTemplateSync", result)
    }

    pub async fn compare_simulation_vs_template(
        &self,
        request: SimulationRequest,
    ) -> ApiResponse<Comparison> {
        let result = self.manager.compare(request.simulation_id).await;
        ApiResponse::from_result("compareSimulationVsTemplate", result)
    }

    pub async fn delete_simulation(
        &self,
        actor: &Actor,
        request: DeleteSimulationRequest,
    ) -> ApiResponse<DeleteSimulationResponse> {
        let result = self
            .manager
            .delete(actor, request.simulation_id, request.archive_to_history)
            .await
            .map(|outcome| DeleteSimulationResponse {
                deleted_patients: outcome.report.deleted(EntityKind::Patient),
                deleted_medications: outcome.report.deleted(EntityKind::Medication),
                tenant_id: outcome.tenant_id,
                archived: outcome.archived,
            });
        ApiResponse::from_result("deleteSimulation", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haccare_core::error::CoreError;
    use serde_json::json;

    #[test]
    fn success_envelope_flattens_payload() {
        let response = ApiResponse::ok(CreateSnapshotResponse { version: 3 });
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "success": true, "version": 3 })
        );
    }

    #[test]
    fn failure_envelope_carries_code() {
        let response: ApiResponse<CreateSnapshotResponse> = ApiResponse::from_result(
            "createSnapshot",
            Err(CoreError::RelaunchRequired {
                reason: "patient added".into(),
            }),
        );
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["errorCode"], json!("RELAUNCH_REQUIRED"));
        assert!(value["error"].as_str().unwrap().contains("patient added"));
        assert!(value.get("version").is_none());
    }

    #[test]
    fn launch_request_validates_roles() {
        let request: LaunchSimulationRequest = serde_json::from_value(json!({
            "templateId": Uuid::new_v4(),
            "name": "Ward A",
            "participantUserIds": [Uuid::new_v4(), Uuid::new_v4()],
            "participantRoles": ["Instructor", "student"],
        }))
        .unwrap();
        let participants = request.participants().unwrap();
        assert_eq!(participants[0].role, SimulationRole::Instructor);
        assert_eq!(participants[1].role, SimulationRole::Student);

        let mismatched = LaunchSimulationRequest {
            participant_roles: vec!["student".into()],
            ..request.clone()
        };
        assert!(matches!(
            mismatched.participants(),
            Err(LifecycleError::ParticipantMismatch { users: 2, roles: 1 })
        ));

        let unknown = LaunchSimulationRequest {
            participant_roles: vec!["student".into(), "janitor".into()],
            ..request
        };
        assert!(matches!(
            unknown.participants(),
            Err(LifecycleError::UnknownRole(role)) if role == "janitor"
        ));
    }
}
