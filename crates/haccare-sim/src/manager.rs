//! Simulation lifecycle orchestration.
//!
//! The manager owns the [`ActiveSimulation`] state machine and composes
//! the snapshot, restore, reconciliation and teardown engines. Each
//! operation plans all of its writes into one [`ChangeSet`] and applies it
//! as a single transaction, serialized per simulation.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use haccare_core::changeset::{ChangeSet, Mutation};
use haccare_core::error::{CoreError, CoreResult};
use haccare_core::models::access::{AccessRole, TenantAccess};
use haccare_core::models::audit::AuditLogEntry;
use haccare_core::models::history::SimulationHistory;
use haccare_core::models::participant::{SimulationParticipant, SimulationRole};
use haccare_core::models::simulation::{ActiveSimulation, SimulationStatus};
use haccare_core::models::snapshot::Snapshot;
use haccare_core::models::template::{CreateTemplate, SimulationTemplate, TemplateStatus};
use haccare_core::models::tenant::{CreateTenant, Tenant, TenantType};
use haccare_core::registry::{EntityKind, EntityRegistry};
use haccare_core::repository::{
    ChangeSetWriter, EntityRepository, Repositories, SimulationRepository, TemplateRepository,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::LifecycleConfig;
use crate::error::LifecycleError;
use crate::lock::SimulationLocks;
use crate::reconcile::ReconciliationEngine;
use crate::restore::{BarcodeMap, RestoreEngine, RestoreOptions, RestoreReport};
use crate::snapshot::SnapshotBuilder;
use crate::teardown::{TeardownPlan, TeardownReport, TenantTeardownService};

/// The user an operation is performed for.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    /// The user's own tenant; simulations they launch become its children.
    pub home_tenant_id: Option<Uuid>,
    /// Super-admin style users may launch without a home tenant.
    pub privileged: bool,
}

#[derive(Debug, Clone)]
pub struct TemplateRequest {
    pub name: String,
    pub description: Option<String>,
    pub default_duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct ParticipantSpec {
    pub user_id: Uuid,
    pub role: SimulationRole,
}

#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub template_id: Uuid,
    pub name: String,
    /// Falls back to the template's default duration.
    pub duration_minutes: Option<u32>,
    pub participants: Vec<ParticipantSpec>,
    pub primary_categories: Vec<String>,
    pub sub_categories: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub version: u64,
    pub counts: BTreeMap<EntityKind, usize>,
}

#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub simulation: ActiveSimulation,
    pub report: RestoreReport,
}

#[derive(Debug, Clone)]
pub struct ResetOutcome {
    pub simulation: ActiveSimulation,
    pub report: RestoreReport,
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub simulation: ActiveSimulation,
    pub template_version_synced: u64,
    pub medications_added: usize,
    pub medications_removed: usize,
    pub medication_labels: Vec<String>,
    pub report: RestoreReport,
}

/// Live counts next to template counts for the kinds instructors track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub patient_count_old: u64,
    pub patient_count_new: u64,
    pub medication_count_old: u64,
    pub medication_count_new: u64,
    pub order_count_old: u64,
    pub order_count_new: u64,
    pub wound_count_old: u64,
    pub wound_count_new: u64,
    pub device_count_old: u64,
    pub device_count_new: u64,
    pub version_synced: u64,
    pub version_current: u64,
}

#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub tenant_id: Uuid,
    pub archived: bool,
    pub report: TeardownReport,
}

fn audit(action: &str, actor: Option<Uuid>, sim: &ActiveSimulation, metadata: serde_json::Value) -> Mutation {
    Mutation::AppendAudit(
        AuditLogEntry::success(action, actor, metadata).for_simulation(sim.id, sim.tenant_id),
    )
}

pub struct SimulationLifecycleManager<R: Repositories> {
    repos: R,
    registry: EntityRegistry,
    config: LifecycleConfig,
    locks: SimulationLocks,
}

impl<R: Repositories> SimulationLifecycleManager<R> {
    pub fn new(repos: R, registry: EntityRegistry, config: LifecycleConfig) -> Self {
        Self {
            repos,
            registry,
            config,
            locks: SimulationLocks::default(),
        }
    }

    pub fn repos(&self) -> &R {
        &self.repos
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    fn restore_engine(&self) -> RestoreEngine<'_> {
        RestoreEngine::new(&self.registry, &self.config.barcode_prefix)
    }

    fn parent_tenant(&self, actor: &Actor) -> Result<Uuid, LifecycleError> {
        actor
            .home_tenant_id
            .or(if actor.privileged {
                self.config.fallback_parent_tenant_id
            } else {
                None
            })
            .ok_or(LifecycleError::NoParentTenant)
    }

    fn check_duration(&self, minutes: u32) -> Result<u32, LifecycleError> {
        let max = self.config.max_duration_minutes;
        if minutes == 0 || minutes > max {
            return Err(LifecycleError::InvalidDuration { minutes, max });
        }
        Ok(minutes)
    }

    async fn load_template_snapshot(
        &self,
        template_id: Uuid,
    ) -> CoreResult<(SimulationTemplate, Snapshot)> {
        let mut template = self.repos.templates().get_by_id(template_id).await?;
        let snapshot = template
            .snapshot
            .take()
            .ok_or(LifecycleError::MissingSnapshot { template_id })?;
        Ok((template, snapshot))
    }

    // -------------------------------------------------------------------
    // Templates
    // -------------------------------------------------------------------

    /// Create a draft template together with its authoring tenant.
    pub async fn create_template(
        &self,
        actor: &Actor,
        request: TemplateRequest,
    ) -> CoreResult<SimulationTemplate> {
        let parent = self.parent_tenant(actor)?;
        let duration = self.check_duration(
            request
                .default_duration_minutes
                .unwrap_or(self.config.default_duration_minutes),
        )?;

        let tenant = Tenant::new(CreateTenant {
            name: request.name.clone(),
            tenant_type: TenantType::Template,
            parent_tenant_id: Some(parent),
        });
        let template = SimulationTemplate::new(CreateTemplate {
            tenant_id: tenant.id,
            name: request.name,
            description: request.description,
            default_duration_minutes: duration,
            created_by: Some(actor.user_id),
        });

        let mut changes = ChangeSet::new();
        changes
            .push(Mutation::CreateTenant(tenant.clone()))
            .push(Mutation::CreateTemplate(template.clone()))
            .push(Mutation::GrantAccess(TenantAccess {
                id: Uuid::new_v4(),
                tenant_id: tenant.id,
                user_id: actor.user_id,
                role: AccessRole::Admin,
                granted_at: Utc::now(),
            }))
            .push(Mutation::AppendAudit(AuditLogEntry::success(
                "template.create",
                Some(actor.user_id),
                json!({ "template_id": template.id, "tenant_id": tenant.id }),
            )));
        self.repos.writer().apply(changes).await?;

        info!(template_id = %template.id, tenant_id = %tenant.id, "Created template");
        Ok(template)
    }

    /// Capture the template tenant's data onto the template, bumping its
    /// snapshot version.
    pub async fn create_snapshot(
        &self,
        actor: &Actor,
        template_id: Uuid,
    ) -> CoreResult<SnapshotOutcome> {
        let _guard = self.locks.acquire(template_id).await;
        let template = self.repos.templates().get_by_id(template_id).await?;
        let snapshot = SnapshotBuilder::new(&self.repos, &self.registry)
            .build(template.tenant_id, Some(actor.user_id))
            .await?;
        let counts = snapshot.metadata.entity_counts.clone();
        let version = template.snapshot_version + 1;

        let mut changes = ChangeSet::new();
        changes
            .push(Mutation::StoreSnapshot {
                template_id,
                snapshot: Box::new(snapshot),
                version,
            })
            .push(Mutation::AppendAudit(AuditLogEntry::success(
                "template.snapshot",
                Some(actor.user_id),
                json!({ "template_id": template_id, "version": version, "counts": counts }),
            )));
        self.repos.writer().apply(changes).await?;

        info!(%template_id, version, "Stored template snapshot");
        Ok(SnapshotOutcome { version, counts })
    }

    // -------------------------------------------------------------------
    // Launch / reset / sync
    // -------------------------------------------------------------------

    /// Clone a ready template into a new isolated simulation tenant.
    pub async fn launch(&self, actor: &Actor, request: LaunchRequest) -> CoreResult<LaunchOutcome> {
        let template_id = request.template_id;
        let (template, snapshot) = self.load_template_snapshot(template_id).await?;
        if template.status != TemplateStatus::Ready {
            return Err(LifecycleError::TemplateNotReady { template_id }.into());
        }
        let duration = self.check_duration(
            request
                .duration_minutes
                .unwrap_or(template.default_duration_minutes),
        )?;
        let mut seen = HashSet::new();
        if let Some(dup) = request.participants.iter().find(|p| !seen.insert(p.user_id)) {
            return Err(LifecycleError::DuplicateParticipant(dup.user_id).into());
        }
        let parent = self.parent_tenant(actor)?;

        let tenant = Tenant::new(CreateTenant {
            name: request.name.clone(),
            tenant_type: TenantType::SimulationActive,
            parent_tenant_id: Some(parent),
        });
        let restore = self
            .restore_engine()
            .plan(tenant.id, &snapshot, &RestoreOptions::fresh())?;

        let now = Utc::now();
        let mut simulation = ActiveSimulation {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            template_id,
            name: request.name,
            status: SimulationStatus::Launching,
            duration_minutes: duration,
            starts_at: now,
            ends_at: now + Duration::minutes(i64::from(duration)),
            template_snapshot_version_synced: template.snapshot_version,
            primary_categories: request.primary_categories,
            sub_categories: request.sub_categories,
            launched_by: Some(actor.user_id),
            first_started_at: None,
            created_at: now,
            updated_at: now,
        };
        simulation.transition(SimulationStatus::Lobby, now)?;

        let participants: Vec<SimulationParticipant> = request
            .participants
            .iter()
            .map(|p| SimulationParticipant {
                id: Uuid::new_v4(),
                simulation_id: simulation.id,
                user_id: p.user_id,
                role: p.role,
            })
            .collect();

        let mut changes = ChangeSet::new();
        changes
            .push(Mutation::CreateTenant(tenant))
            .append(restore.changes)
            .push(Mutation::CreateSimulation(simulation.clone()));
        for participant in &participants {
            changes.push(Mutation::GrantAccess(TenantAccess {
                id: Uuid::new_v4(),
                tenant_id: simulation.tenant_id,
                user_id: participant.user_id,
                role: participant.role.access_role(),
                granted_at: now,
            }));
        }
        if !participants.is_empty() {
            changes.push(Mutation::AddParticipants(participants));
        }
        changes.push(audit(
            "simulation.launch",
            Some(actor.user_id),
            &simulation,
            json!({
                "template_id": template_id,
                "template_version": template.snapshot_version,
                "restored": restore.report.inserted_counts(),
                "skipped": restore.report.total_skipped(),
            }),
        ));
        self.repos.writer().apply(changes).await?;

        info!(
            simulation_id = %simulation.id,
            tenant_id = %simulation.tenant_id,
            %template_id,
            patients = restore.report.inserted(EntityKind::Patient),
            "Launched simulation"
        );
        Ok(LaunchOutcome {
            simulation,
            report: restore.report,
        })
    }

    /// Wipe the simulation's data and restore the template, keeping each
    /// patient's barcode.
    pub async fn reset(&self, actor: &Actor, simulation_id: Uuid) -> CoreResult<ResetOutcome> {
        let _guard = self.locks.acquire(simulation_id).await;
        let mut simulation = self.repos.simulations().get_by_id(simulation_id).await?;
        let (template, snapshot) = self.load_template_snapshot(simulation.template_id).await?;
        let tenant_id = simulation.tenant_id;

        let live_patients = self
            .repos
            .entities()
            .list(tenant_id, EntityKind::Patient)
            .await?;
        let barcodes = BarcodeMap::from_patients(&live_patients);

        let mut changes = ChangeSet::new();
        for kind in self.registry.teardown_order() {
            changes.push(Mutation::PurgeEntities { kind, tenant_id });
        }
        let restore = self.restore_engine().plan(
            tenant_id,
            &snapshot,
            &RestoreOptions::preserving(barcodes),
        )?;
        changes.append(restore.changes);

        let now = Utc::now();
        simulation.transition(SimulationStatus::Lobby, now)?;
        simulation.restart_timer(now);
        simulation.template_snapshot_version_synced = template.snapshot_version;
        changes
            .push(Mutation::UpdateSimulation(simulation.clone()))
            .push(audit(
                "simulation.reset",
                Some(actor.user_id),
                &simulation,
                json!({ "restored": restore.report.inserted_counts() }),
            ));
        self.repos.writer().apply(changes).await?;

        info!(
            %simulation_id,
            %tenant_id,
            restored = restore.report.total_inserted(),
            "Reset simulation"
        );
        Ok(ResetOutcome {
            simulation,
            report: restore.report,
        })
    }

    /// Bring a live simulation up to the template's current snapshot,
    /// applying only the medication delta.
    pub async fn reset_with_sync(
        &self,
        actor: &Actor,
        simulation_id: Uuid,
    ) -> CoreResult<SyncOutcome> {
        let _guard = self.locks.acquire(simulation_id).await;
        let mut simulation = self.repos.simulations().get_by_id(simulation_id).await?;
        let (template, snapshot) = self.load_template_snapshot(simulation.template_id).await?;

        let engine = ReconciliationEngine::new(&self.registry, &self.config.barcode_prefix);
        let plan = match engine
            .plan_sync(&self.repos, simulation.tenant_id, &snapshot)
            .await
        {
            Ok(plan) => plan,
            Err(err @ CoreError::RelaunchRequired { .. }) => {
                warn!(%simulation_id, error = %err, "Template sync refused");
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let now = Utc::now();
        let previous_version = simulation.template_snapshot_version_synced;
        simulation.transition(SimulationStatus::Lobby, now)?;
        simulation.restart_timer(now);
        simulation.template_snapshot_version_synced = template.snapshot_version;

        let mut changes = plan.changes;
        changes
            .push(Mutation::UpdateSimulation(simulation.clone()))
            .push(audit(
                "simulation.sync",
                Some(actor.user_id),
                &simulation,
                json!({
                    "from_version": previous_version,
                    "to_version": template.snapshot_version,
                    "medications_added": plan.medications_added,
                    "medications_removed": plan.medications_removed,
                }),
            ));
        self.repos.writer().apply(changes).await?;

        info!(
            %simulation_id,
            version = template.snapshot_version,
            added = plan.medications_added,
            removed = plan.medications_removed,
            "Synced simulation with template"
        );
        Ok(SyncOutcome {
            simulation,
            template_version_synced: template.snapshot_version,
            medications_added: plan.medications_added,
            medications_removed: plan.medications_removed,
            medication_labels: plan.medication_labels,
            report: plan.report,
        })
    }

    async fn live_count(&self, tenant_id: Uuid, kind: EntityKind) -> CoreResult<u64> {
        if self.registry.is_supported(kind) {
            self.repos.entities().count(tenant_id, kind).await
        } else {
            Ok(0)
        }
    }

    /// Compare live counts against the template's current snapshot.
    pub async fn compare(&self, simulation_id: Uuid) -> CoreResult<Comparison> {
        let simulation = self.repos.simulations().get_by_id(simulation_id).await?;
        let template = self
            .repos
            .templates()
            .get_by_id(simulation.template_id)
            .await?;

        let tenant_id = simulation.tenant_id;
        let planned = |kind: EntityKind| -> u64 {
            template
                .snapshot
                .as_ref()
                .map_or(0, |s| s.count(kind) as u64)
        };

        Ok(Comparison {
            patient_count_old: self.live_count(tenant_id, EntityKind::Patient).await?,
            patient_count_new: planned(EntityKind::Patient),
            medication_count_old: self.live_count(tenant_id, EntityKind::Medication).await?,
            medication_count_new: planned(EntityKind::Medication),
            order_count_old: self.live_count(tenant_id, EntityKind::Order).await?,
            order_count_new: planned(EntityKind::Order),
            wound_count_old: self.live_count(tenant_id, EntityKind::Wound).await?,
            wound_count_new: planned(EntityKind::Wound),
            device_count_old: self.live_count(tenant_id, EntityKind::Device).await?,
            device_count_new: planned(EntityKind::Device),
            version_synced: simulation.template_snapshot_version_synced,
            version_current: template.snapshot_version,
        })
    }

    // -------------------------------------------------------------------
    // Delete
    // -------------------------------------------------------------------

    /// Tear down the simulation tenant subtree and remove the simulation,
    /// archiving a summary first when asked and the simulation ran.
    pub async fn delete(
        &self,
        actor: &Actor,
        simulation_id: Uuid,
        archive_to_history: bool,
    ) -> CoreResult<DeleteOutcome> {
        let guard = self.locks.acquire(simulation_id).await;
        let mut simulation = self.repos.simulations().get_by_id(simulation_id).await?;
        let participants = self
            .repos
            .simulations()
            .list_participants(simulation_id)
            .await?;
        let now = Utc::now();

        let mut changes = ChangeSet::new();
        let archived = archive_to_history && simulation.has_started();
        if archived {
            let count = u32::try_from(participants.len()).unwrap_or(u32::MAX);
            changes.push(Mutation::ArchiveHistory(SimulationHistory::from_simulation(
                &simulation,
                count,
                now,
            )));
        }
        simulation.transition(SimulationStatus::Deleted, now)?;

        let teardown = TenantTeardownService::new(&self.repos, &self.registry);
        let TeardownPlan {
            changes: teardown_changes,
            report,
        } = match teardown.plan(simulation.tenant_id).await {
            Ok(plan) => plan,
            Err(CoreError::NotFound { .. }) => {
                warn!(
                    %simulation_id,
                    tenant_id = %simulation.tenant_id,
                    "Simulation tenant already gone"
                );
                TeardownPlan {
                    changes: ChangeSet::new(),
                    report: TeardownReport::default(),
                }
            }
            Err(err) => return Err(err),
        };

        changes
            .append(teardown_changes)
            .push(Mutation::RemoveParticipants { simulation_id })
            .push(Mutation::DeleteSimulation { simulation_id })
            .push(audit(
                "simulation.delete",
                Some(actor.user_id),
                &simulation,
                json!({
                    "archived": archived,
                    "deleted_patients": report.deleted(EntityKind::Patient),
                    "deleted_medications": report.deleted(EntityKind::Medication),
                    "tenants_removed": report.tenants_removed.len(),
                }),
            ));
        self.repos.writer().apply(changes).await?;

        drop(guard);
        self.locks.forget(simulation_id);

        info!(
            %simulation_id,
            tenant_id = %simulation.tenant_id,
            archived,
            "Deleted simulation"
        );
        Ok(DeleteOutcome {
            tenant_id: simulation.tenant_id,
            archived,
            report,
        })
    }

    // -------------------------------------------------------------------
    // State transitions
    // -------------------------------------------------------------------

    async fn transition(
        &self,
        actor: Option<Uuid>,
        simulation_id: Uuid,
        action: &'static str,
        from: &[SimulationStatus],
        next: SimulationStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<ActiveSimulation> {
        let _guard = self.locks.acquire(simulation_id).await;
        let mut simulation = self.repos.simulations().get_by_id(simulation_id).await?;
        if !from.contains(&simulation.status) {
            return Err(LifecycleError::WrongStatus {
                simulation_id,
                action,
                status: simulation.status.as_str(),
            }
            .into());
        }
        let previous = simulation.status;
        simulation.transition(next, now)?;

        let mut changes = ChangeSet::new();
        changes
            .push(Mutation::UpdateSimulation(simulation.clone()))
            .push(audit(
                &format!("simulation.{action}"),
                actor,
                &simulation,
                json!({ "from": previous.as_str(), "to": next.as_str() }),
            ));
        self.repos.writer().apply(changes).await?;

        info!(%simulation_id, from = previous.as_str(), to = next.as_str(), "Simulation transitioned");
        Ok(simulation)
    }

    pub async fn start(&self, actor: &Actor, simulation_id: Uuid) -> CoreResult<ActiveSimulation> {
        self.transition(
            Some(actor.user_id),
            simulation_id,
            "start",
            &[SimulationStatus::Lobby],
            SimulationStatus::Running,
            Utc::now(),
        )
        .await
    }

    pub async fn pause(&self, actor: &Actor, simulation_id: Uuid) -> CoreResult<ActiveSimulation> {
        self.transition(
            Some(actor.user_id),
            simulation_id,
            "pause",
            &[SimulationStatus::Running],
            SimulationStatus::Paused,
            Utc::now(),
        )
        .await
    }

    pub async fn resume(&self, actor: &Actor, simulation_id: Uuid) -> CoreResult<ActiveSimulation> {
        self.transition(
            Some(actor.user_id),
            simulation_id,
            "resume",
            &[SimulationStatus::Paused],
            SimulationStatus::Running,
            Utc::now(),
        )
        .await
    }

    pub async fn complete(&self, actor: &Actor, simulation_id: Uuid) -> CoreResult<ActiveSimulation> {
        self.transition(
            Some(actor.user_id),
            simulation_id,
            "complete",
            &[SimulationStatus::Running, SimulationStatus::Paused],
            SimulationStatus::Completed,
            Utc::now(),
        )
        .await
    }

    /// Complete every running or paused simulation whose timer ran out by
    /// `now`. Returns the completed simulation ids.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> CoreResult<Vec<Uuid>> {
        let mut expired = Vec::new();
        for simulation in self.repos.simulations().list().await? {
            if !simulation.is_expired(now) {
                continue;
            }
            let result = self
                .transition(
                    None,
                    simulation.id,
                    "expire",
                    &[SimulationStatus::Running, SimulationStatus::Paused],
                    SimulationStatus::Completed,
                    now,
                )
                .await;
            match result {
                Ok(_) => expired.push(simulation.id),
                // Moved on concurrently; nothing to expire.
                Err(CoreError::InvalidState { .. } | CoreError::NotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired simulations");
        }
        Ok(expired)
    }
}
