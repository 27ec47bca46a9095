//! Unit-of-work for lifecycle operations.
//!
//! Engines plan their writes into a [`ChangeSet`] instead of touching
//! storage directly; the storage layer applies a whole change set in one
//! transaction, in order. Because every mutation is planned up front, a
//! launch, reset or delete either lands completely or not at all.

use uuid::Uuid;

use crate::models::access::TenantAccess;
use crate::models::audit::AuditLogEntry;
use crate::models::entity::EntityRecord;
use crate::models::history::SimulationHistory;
use crate::models::participant::SimulationParticipant;
use crate::models::simulation::ActiveSimulation;
use crate::models::snapshot::Snapshot;
use crate::models::template::SimulationTemplate;
use crate::models::tenant::Tenant;
use crate::registry::EntityKind;

#[derive(Debug, Clone)]
pub enum Mutation {
    CreateTenant(Tenant),
    DeleteTenant {
        tenant_id: Uuid,
    },
    InsertEntities {
        kind: EntityKind,
        records: Vec<EntityRecord>,
    },
    DeleteEntities {
        kind: EntityKind,
        ids: Vec<Uuid>,
    },
    /// Delete every row of `kind` owned by the tenant, directly or
    /// through one of its patients.
    PurgeEntities {
        kind: EntityKind,
        tenant_id: Uuid,
    },
    CreateTemplate(SimulationTemplate),
    /// Replace the template's snapshot and mark it ready. Fails the whole
    /// change set unless the stored version is `version - 1`.
    StoreSnapshot {
        template_id: Uuid,
        snapshot: Box<Snapshot>,
        version: u64,
    },
    GrantAccess(TenantAccess),
    RevokeTenantAccess {
        tenant_id: Uuid,
    },
    CreateSimulation(ActiveSimulation),
    UpdateSimulation(ActiveSimulation),
    DeleteSimulation {
        simulation_id: Uuid,
    },
    AddParticipants(Vec<SimulationParticipant>),
    RemoveParticipants {
        simulation_id: Uuid,
    },
    ArchiveHistory(SimulationHistory),
    AppendAudit(AuditLogEntry),
}

#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    mutations: Vec<Mutation>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    /// Queue an insert, skipping empty batches.
    pub fn insert_entities(&mut self, kind: EntityKind, records: Vec<EntityRecord>) -> &mut Self {
        if !records.is_empty() {
            self.mutations
                .push(Mutation::InsertEntities { kind, records });
        }
        self
    }

    pub fn delete_entities(&mut self, kind: EntityKind, ids: Vec<Uuid>) -> &mut Self {
        if !ids.is_empty() {
            self.mutations.push(Mutation::DeleteEntities { kind, ids });
        }
        self
    }

    pub fn append(&mut self, other: ChangeSet) -> &mut Self {
        self.mutations.extend(other.mutations);
        self
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Rows queued for insertion, per kind.
    pub fn inserted(&self, kind: EntityKind) -> usize {
        self.mutations
            .iter()
            .map(|m| match m {
                Mutation::InsertEntities { kind: k, records } if *k == kind => records.len(),
                _ => 0,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn record(kind: EntityKind) -> EntityRecord {
        EntityRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            kind,
            fields: Map::new(),
        }
    }

    #[test]
    fn empty_batches_are_not_queued() {
        let mut changes = ChangeSet::new();
        changes
            .insert_entities(EntityKind::Note, vec![])
            .delete_entities(EntityKind::Note, vec![]);
        assert!(changes.is_empty());
    }

    #[test]
    fn append_keeps_order() {
        let mut a = ChangeSet::new();
        a.insert_entities(EntityKind::Patient, vec![record(EntityKind::Patient)]);
        let mut b = ChangeSet::new();
        b.insert_entities(
            EntityKind::Medication,
            vec![record(EntityKind::Medication), record(EntityKind::Medication)],
        );
        a.append(b);
        assert_eq!(a.len(), 2);
        assert!(matches!(
            a.mutations()[0],
            Mutation::InsertEntities {
                kind: EntityKind::Patient,
                ..
            }
        ));
        assert_eq!(a.inserted(EntityKind::Medication), 2);
    }
}
