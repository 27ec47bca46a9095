//! Cascading deletion of a tenant subtree.

use std::collections::{BTreeMap, HashSet, VecDeque};

use haccare_core::changeset::{ChangeSet, Mutation};
use haccare_core::error::CoreResult;
use haccare_core::registry::{EntityKind, EntityRegistry};
use haccare_core::repository::{ChangeSetWriter, EntityRepository, Repositories, TenantRepository};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// Rows deleted per kind, summed over every removed tenant.
    pub deleted: BTreeMap<EntityKind, u64>,
    /// Removed tenants, children before their parents.
    pub tenants_removed: Vec<Uuid>,
}

impl TeardownReport {
    pub fn deleted(&self, kind: EntityKind) -> u64 {
        self.deleted.get(&kind).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct TeardownPlan {
    pub changes: ChangeSet,
    pub report: TeardownReport,
}

pub struct TenantTeardownService<'a, R: Repositories> {
    repos: &'a R,
    registry: &'a EntityRegistry,
}

impl<'a, R: Repositories> TenantTeardownService<'a, R> {
    pub fn new(repos: &'a R, registry: &'a EntityRegistry) -> Self {
        Self { repos, registry }
    }

    /// Tenants under `root` (inclusive), ordered so every tenant comes
    /// after all of its descendants.
    async fn subtree(&self, root: Uuid) -> CoreResult<Vec<Uuid>> {
        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);
        let mut level_order = Vec::new();
        while let Some(tenant_id) = queue.pop_front() {
            level_order.push(tenant_id);
            for child in self.repos.tenants().list_children(tenant_id).await? {
                if seen.insert(child.id) {
                    queue.push_back(child.id);
                } else {
                    warn!(%tenant_id, child_id = %child.id, "Tenant hierarchy revisits a tenant");
                }
            }
        }
        level_order.reverse();
        Ok(level_order)
    }

    /// Plan deletion of `tenant_id` and every tenant beneath it.
    pub async fn plan(&self, tenant_id: Uuid) -> CoreResult<TeardownPlan> {
        self.repos.tenants().get_by_id(tenant_id).await?;

        let order = self.registry.teardown_order();
        let mut changes = ChangeSet::new();
        let mut report = TeardownReport::default();

        for tenant in self.subtree(tenant_id).await? {
            for &kind in &order {
                let count = self.repos.entities().count_owned(tenant, kind).await?;
                *report.deleted.entry(kind).or_default() += count;
                changes.push(Mutation::PurgeEntities {
                    kind,
                    tenant_id: tenant,
                });
            }
            changes
                .push(Mutation::RevokeTenantAccess { tenant_id: tenant })
                .push(Mutation::DeleteTenant { tenant_id: tenant });
            report.tenants_removed.push(tenant);
            debug!(%tenant, "Planned tenant teardown");
        }

        Ok(TeardownPlan { changes, report })
    }

    /// Delete `tenant_id` and its subtree in one transaction.
    pub async fn teardown(&self, tenant_id: Uuid) -> CoreResult<TeardownReport> {
        let plan = self.plan(tenant_id).await?;
        self.repos.writer().apply(plan.changes).await?;
        info!(
            %tenant_id,
            tenants = plan.report.tenants_removed.len(),
            patients = plan.report.deleted(EntityKind::Patient),
            "Tore down tenant subtree"
        );
        Ok(plan.report)
    }
}
