//! Versioned snapshot documents.
//!
//! A snapshot is an immutable capture of a tenant's patient-care data: one
//! array of loosely-typed row documents per entity kind plus a metadata
//! block. Rows keep the ids they had in the source tenant; restoring
//! remaps them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::registry::EntityKind;

/// Layout version of the snapshot document itself.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub source_tenant_id: Uuid,
    pub entity_counts: BTreeMap<EntityKind, usize>,
    /// Hex SHA-256 over the canonical form of `entities`.
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    #[serde(default)]
    pub entities: BTreeMap<EntityKind, Vec<Value>>,
}

impl Snapshot {
    pub fn new(
        source_tenant_id: Uuid,
        created_by: Option<Uuid>,
        entities: BTreeMap<EntityKind, Vec<Value>>,
    ) -> Self {
        let metadata = SnapshotMetadata {
            format_version: SNAPSHOT_FORMAT_VERSION,
            created_at: Utc::now(),
            created_by,
            source_tenant_id,
            entity_counts: entities.iter().map(|(k, rows)| (*k, rows.len())).collect(),
            checksum: checksum(&entities),
        };
        Self { metadata, entities }
    }

    pub fn rows(&self, kind: EntityKind) -> &[Value] {
        self.entities.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.rows(kind).len()
    }

    pub fn verify_checksum(&self) -> bool {
        checksum(&self.entities) == self.metadata.checksum
    }

    /// A derived snapshot keeping only the rows `keep` accepts. Counts and
    /// checksum are recomputed; provenance is kept.
    pub fn filtered(&self, mut keep: impl FnMut(EntityKind, &Value) -> bool) -> Snapshot {
        let entities: BTreeMap<EntityKind, Vec<Value>> = self
            .entities
            .iter()
            .map(|(kind, rows)| {
                let kept = rows.iter().filter(|row| keep(*kind, row)).cloned().collect();
                (*kind, kept)
            })
            .collect();
        let mut metadata = self.metadata.clone();
        metadata.entity_counts = entities.iter().map(|(k, rows)| (*k, rows.len())).collect();
        metadata.checksum = checksum(&entities);
        Snapshot { metadata, entities }
    }
}

/// Object keys are re-inserted in sorted order so the digest does not
/// depend on map ordering.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for key in keys {
                out.insert(key.clone(), canonical(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

fn checksum(entities: &BTreeMap<EntityKind, Vec<Value>>) -> String {
    let mut hasher = Sha256::new();
    for (kind, rows) in entities {
        hasher.update(kind.snapshot_key().as_bytes());
        for row in rows {
            hasher.update(canonical(row).to_string().as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}
