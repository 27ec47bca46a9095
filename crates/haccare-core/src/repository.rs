//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Reads go through the per-concern
//! repositories; every lifecycle write goes through [`ChangeSetWriter`] so
//! it lands in a single transaction.

use uuid::Uuid;

use crate::changeset::ChangeSet;
use crate::error::CoreResult;
use crate::models::{
    access::TenantAccess,
    audit::AuditLogEntry,
    entity::EntityRecord,
    history::SimulationHistory,
    participant::SimulationParticipant,
    simulation::ActiveSimulation,
    template::SimulationTemplate,
    tenant::{CreateTenant, Tenant},
};
use crate::registry::EntityKind;

// ---------------------------------------------------------------------------
// Tenants & templates
// ---------------------------------------------------------------------------

pub trait TenantRepository: Send + Sync {
    fn create(&self, input: CreateTenant) -> impl Future<Output = CoreResult<Tenant>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = CoreResult<Tenant>> + Send;
    /// Tenants whose `parent_tenant_id` is `parent_id`.
    fn list_children(
        &self,
        parent_id: Uuid,
    ) -> impl Future<Output = CoreResult<Vec<Tenant>>> + Send;
}

/// Templates are written through [`ChangeSetWriter`] so that a template,
/// its tenant and its snapshot versions land with their audit entries.
pub trait TemplateRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = CoreResult<SimulationTemplate>> + Send;
}

// ---------------------------------------------------------------------------
// Simulations
// ---------------------------------------------------------------------------

pub trait SimulationRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = CoreResult<ActiveSimulation>> + Send;
    fn list(&self) -> impl Future<Output = CoreResult<Vec<ActiveSimulation>>> + Send;
    fn list_participants(
        &self,
        simulation_id: Uuid,
    ) -> impl Future<Output = CoreResult<Vec<SimulationParticipant>>> + Send;
    fn list_history(
        &self,
        template_id: Uuid,
    ) -> impl Future<Output = CoreResult<Vec<SimulationHistory>>> + Send;
}

pub trait AccessRepository: Send + Sync {
    fn list_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> impl Future<Output = CoreResult<Vec<TenantAccess>>> + Send;
    fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = CoreResult<Vec<TenantAccess>>> + Send;
}

pub trait AuditRepository: Send + Sync {
    fn list_for_simulation(
        &self,
        simulation_id: Uuid,
    ) -> impl Future<Output = CoreResult<Vec<AuditLogEntry>>> + Send;
}

// ---------------------------------------------------------------------------
// Patient-care entities (tenant scope)
// ---------------------------------------------------------------------------

pub trait EntityRepository: Send + Sync {
    fn list(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
    ) -> impl Future<Output = CoreResult<Vec<EntityRecord>>> + Send;
    fn count(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
    ) -> impl Future<Output = CoreResult<u64>> + Send;
    /// Rows a purge of `tenant_id` removes: stamped with the tenant or
    /// owned by one of its patients.
    fn count_owned(
        &self,
        tenant_id: Uuid,
        kind: EntityKind,
    ) -> impl Future<Output = CoreResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

pub trait ChangeSetWriter: Send + Sync {
    /// Apply every mutation in order inside one transaction. Any failure
    /// rolls the whole change set back.
    fn apply(&self, changes: ChangeSet) -> impl Future<Output = CoreResult<()>> + Send;
}

/// Bundle of repositories the lifecycle engine runs against.
pub trait Repositories: Send + Sync {
    type Tenants: TenantRepository;
    type Templates: TemplateRepository;
    type Simulations: SimulationRepository;
    type Access: AccessRepository;
    type Audit: AuditRepository;
    type Entities: EntityRepository;
    type Writer: ChangeSetWriter;

    fn tenants(&self) -> &Self::Tenants;
    fn templates(&self) -> &Self::Templates;
    fn simulations(&self) -> &Self::Simulations;
    fn access(&self) -> &Self::Access;
    fn audit(&self) -> &Self::Audit;
    fn entities(&self) -> &Self::Entities;
    fn writer(&self) -> &Self::Writer;
}
