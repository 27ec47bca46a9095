//! Capture of a tenant's patient-care dataset as a [`Snapshot`].

use std::collections::{BTreeMap, HashSet};

use haccare_core::error::CoreResult;
use haccare_core::models::snapshot::Snapshot;
use haccare_core::registry::{EntityKind, EntityRegistry, Scope};
use haccare_core::repository::{EntityRepository, Repositories, TenantRepository};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

/// Reads a tenant's rows for every supported entity kind. Never writes.
pub struct SnapshotBuilder<'a, R: Repositories> {
    repos: &'a R,
    registry: &'a EntityRegistry,
}

impl<'a, R: Repositories> SnapshotBuilder<'a, R> {
    pub fn new(repos: &'a R, registry: &'a EntityRegistry) -> Self {
        Self { repos, registry }
    }

    /// Build a snapshot of `tenant_id`.
    ///
    /// Tenant-scoped kinds are selected by `tenant_id`; patient-scoped
    /// kinds additionally have to belong to one of the tenant's patients.
    /// Every supported kind gets an array, empty when the tenant has no
    /// rows of it.
    pub async fn build(&self, tenant_id: Uuid, created_by: Option<Uuid>) -> CoreResult<Snapshot> {
        self.repos.tenants().get_by_id(tenant_id).await?;

        let mut patients: HashSet<Uuid> = HashSet::new();
        let mut entities: BTreeMap<EntityKind, Vec<Value>> = BTreeMap::new();

        for kind in self.registry.supported_order() {
            let descriptor = self.registry.descriptor(kind)?;
            let records = self.repos.entities().list(tenant_id, kind).await?;
            let total = records.len();

            let rows: Vec<Value> = records
                .iter()
                .filter(|record| match descriptor.scope {
                    Scope::Tenant => true,
                    Scope::Patient => record.patient_id().is_some_and(|p| patients.contains(&p)),
                })
                .map(|record| record.to_document())
                .collect();

            if kind == EntityKind::Patient {
                patients.extend(records.iter().map(|r| r.id));
            }
            if rows.len() < total {
                debug!(
                    %tenant_id,
                    %kind,
                    dropped = total - rows.len(),
                    "Excluded rows not owned by a tenant patient"
                );
            }
            entities.insert(kind, rows);
        }

        let snapshot = Snapshot::new(tenant_id, created_by, entities);
        info!(
            %tenant_id,
            patients = snapshot.count(EntityKind::Patient),
            medications = snapshot.count(EntityKind::Medication),
            "Built snapshot"
        );
        Ok(snapshot)
    }
}
