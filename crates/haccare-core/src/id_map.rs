//! Old-id → new-id translation tables scoped to one restore or reconcile
//! call. Never persisted.

use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::registry::EntityKind;

#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    maps: BTreeMap<EntityKind, HashMap<Uuid, Uuid>>,
}

/// Returned when an old id is mapped twice for the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateOldId {
    pub kind: EntityKind,
    pub old_id: Uuid,
    pub existing: Uuid,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `old -> new`. An old id can only be mapped once per kind.
    pub fn insert(&mut self, kind: EntityKind, old: Uuid, new: Uuid) -> Result<(), DuplicateOldId> {
        let map = self.maps.entry(kind).or_default();
        if let Some(existing) = map.get(&old) {
            return Err(DuplicateOldId {
                kind,
                old_id: old,
                existing: *existing,
            });
        }
        map.insert(old, new);
        Ok(())
    }

    pub fn resolve(&self, kind: EntityKind, old: Uuid) -> Option<Uuid> {
        self.maps.get(&kind).and_then(|m| m.get(&old)).copied()
    }

    pub fn contains(&self, kind: EntityKind, old: Uuid) -> bool {
        self.resolve(kind, old).is_some()
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.maps.get(&kind).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.maps.values().all(HashMap::is_empty)
    }

    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.maps.keys().copied()
    }

    /// `(old, new)` pairs for one kind.
    pub fn entries(&self, kind: EntityKind) -> impl Iterator<Item = (Uuid, Uuid)> + '_ {
        self.maps
            .get(&kind)
            .into_iter()
            .flat_map(|m| m.iter().map(|(o, n)| (*o, *n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_do_not_collide() {
        let mut map = IdentifierMap::new();
        let old = Uuid::new_v4();
        let (p, m) = (Uuid::new_v4(), Uuid::new_v4());
        map.insert(EntityKind::Patient, old, p).unwrap();
        map.insert(EntityKind::Medication, old, m).unwrap();
        assert_eq!(map.resolve(EntityKind::Patient, old), Some(p));
        assert_eq!(map.resolve(EntityKind::Medication, old), Some(m));
        assert_eq!(map.resolve(EntityKind::Vital, old), None);
    }

    #[test]
    fn duplicate_old_ids_are_rejected() {
        let mut map = IdentifierMap::new();
        let old = Uuid::new_v4();
        let first = Uuid::new_v4();
        map.insert(EntityKind::Patient, old, first).unwrap();
        let err = map
            .insert(EntityKind::Patient, old, Uuid::new_v4())
            .unwrap_err();
        assert_eq!(err.existing, first);
        assert_eq!(map.len(EntityKind::Patient), 1);
    }
}
