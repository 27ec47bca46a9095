//! Schema-driven registry of the patient-care entity types a tenant holds.
//!
//! Each [`EntityDescriptor`] declares the shape of its rows, the entity
//! types it references, whether its table only exists in later schema
//! revisions, and how it behaves during a template sync. Processing order
//! for snapshot restore is derived from the declared dependencies rather
//! than maintained by hand.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum EntityKind {
    #[serde(rename = "patients")]
    Patient,
    #[serde(rename = "body_locations")]
    BodyLocation,
    #[serde(rename = "medications")]
    Medication,
    #[serde(rename = "vitals")]
    Vital,
    #[serde(rename = "notes")]
    Note,
    #[serde(rename = "alerts")]
    Alert,
    #[serde(rename = "devices")]
    Device,
    #[serde(rename = "wounds")]
    Wound,
    #[serde(rename = "orders")]
    Order,
    #[serde(rename = "assessments")]
    Assessment,
    #[serde(rename = "directives")]
    Directive,
    #[serde(rename = "administrations")]
    Administration,
    #[serde(rename = "wound_assessments")]
    WoundAssessment,
}

impl EntityKind {
    pub const ALL: [EntityKind; 13] = [
        EntityKind::Patient,
        EntityKind::BodyLocation,
        EntityKind::Medication,
        EntityKind::Vital,
        EntityKind::Note,
        EntityKind::Alert,
        EntityKind::Device,
        EntityKind::Wound,
        EntityKind::Order,
        EntityKind::Assessment,
        EntityKind::Directive,
        EntityKind::Administration,
        EntityKind::WoundAssessment,
    ];

    /// Storage table name.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Patient => "patient",
            EntityKind::BodyLocation => "body_location",
            EntityKind::Medication => "medication",
            EntityKind::Vital => "vital",
            EntityKind::Note => "note",
            EntityKind::Alert => "alert",
            EntityKind::Device => "device",
            EntityKind::Wound => "wound",
            EntityKind::Order => "care_order",
            EntityKind::Assessment => "assessment",
            EntityKind::Directive => "directive",
            EntityKind::Administration => "administration",
            EntityKind::WoundAssessment => "wound_assessment",
        }
    }

    /// Array name inside a snapshot document.
    pub fn snapshot_key(&self) -> &'static str {
        match self {
            EntityKind::Patient => "patients",
            EntityKind::BodyLocation => "body_locations",
            EntityKind::Medication => "medications",
            EntityKind::Vital => "vitals",
            EntityKind::Note => "notes",
            EntityKind::Alert => "alerts",
            EntityKind::Device => "devices",
            EntityKind::Wound => "wounds",
            EntityKind::Order => "orders",
            EntityKind::Assessment => "assessments",
            EntityKind::Directive => "directives",
            EntityKind::Administration => "administrations",
            EntityKind::WoundAssessment => "wound_assessments",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.snapshot_key())
    }
}

/// Loosely-typed document values are coerced into one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Decimal,
    Boolean,
    /// Calendar date, stored as `YYYY-MM-DD`.
    Date,
    /// Instant, stored as RFC 3339 in UTC.
    DateTime,
    TextList,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
}

const fn req(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        required: true,
    }
}

const fn opt(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        required: false,
    }
}

/// A foreign-key-shaped field pointing at another entity type.
#[derive(Debug, Clone, Copy)]
pub struct Dependency {
    pub field: &'static str,
    pub kind: EntityKind,
    /// Rows whose required reference cannot be resolved are skipped;
    /// unresolved optional references are cleared.
    pub required: bool,
}

/// Optional table groups introduced by later schema revisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    BodyLocations,
    Devices,
    Wounds,
    AdvanceDirectives,
}

/// How an entity type is treated when a live simulation is synced to an
/// updated template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Matched to the template by business key; only the delta changes.
    Match,
    /// Wiped and restored from the template baseline.
    Replace,
    /// Left untouched.
    Preserve,
}

/// Whether rows belong to the tenant directly or through a patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Tenant,
    Patient,
}

#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    pub scope: Scope,
    pub fields: &'static [FieldSpec],
    pub depends_on: &'static [Dependency],
    pub capability: Option<Capability>,
    pub sync: SyncStrategy,
}

impl EntityDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn dependency(&self, field: &str) -> Option<&Dependency> {
        self.depends_on.iter().find(|d| d.field == field)
    }
}

/// Field holding a row's owning patient.
pub const PATIENT_REF: &str = "patient_id";
/// Field carrying the stable per-template sequence key.
pub const TEMPLATE_KEY: &str = "template_key";
/// Human-facing patient identifier printed on wristbands.
pub const BARCODE: &str = "barcode";

const PATIENT_OWNER: Dependency = Dependency {
    field: PATIENT_REF,
    kind: EntityKind::Patient,
    required: true,
};

use FieldType::*;

const PATIENT_FIELDS: &[FieldSpec] = &[
    req("first_name", Text),
    req("last_name", Text),
    req("date_of_birth", Date),
    opt(BARCODE, Text),
    opt("gender", Text),
    opt("room_number", Text),
    opt("bed_number", Text),
    opt("admission_date", Date),
    opt("condition", Text),
    opt("diagnosis", Text),
    opt("allergies", TextList),
    opt("blood_type", Text),
    opt("code_status", Text),
    opt("weight_kg", Decimal),
    opt("height_cm", Decimal),
    opt("isolation_precautions", Text),
    opt("emergency_contact_name", Text),
    opt("emergency_contact_phone", Text),
];

const BODY_LOCATION_FIELDS: &[FieldSpec] = &[
    req("region", Text),
    opt("label", Text),
    opt("x", Decimal),
    opt("y", Decimal),
    opt("view", Text),
];

const MEDICATION_FIELDS: &[FieldSpec] = &[
    req("name", Text),
    req("dosage", Text),
    req("route", Text),
    opt("frequency", Text),
    opt("category", Text),
    opt("indication", Text),
    opt("start_date", Date),
    opt("end_date", Date),
    opt("prn", Boolean),
    opt("status", Text),
    opt("prescribed_by", Text),
    opt("next_due", DateTime),
];

const VITAL_FIELDS: &[FieldSpec] = &[
    req("recorded_at", DateTime),
    opt("temperature", Decimal),
    opt("heart_rate", Integer),
    opt("blood_pressure_systolic", Integer),
    opt("blood_pressure_diastolic", Integer),
    opt("respiratory_rate", Integer),
    opt("oxygen_saturation", Integer),
    opt("pain_score", Integer),
    opt("recorded_by", Text),
];

const NOTE_FIELDS: &[FieldSpec] = &[
    req("content", Text),
    opt("note_type", Text),
    opt("author", Text),
    opt("recorded_at", DateTime),
    opt("priority", Text),
];

const ALERT_FIELDS: &[FieldSpec] = &[
    req("alert_type", Text),
    req("message", Text),
    opt("priority", Text),
    opt("acknowledged", Boolean),
    opt("triggered_at", DateTime),
    opt("expires_at", DateTime),
];

const DEVICE_FIELDS: &[FieldSpec] = &[
    req("device_type", Text),
    opt("size", Text),
    opt("placed_at", DateTime),
    opt("placed_by", Text),
    opt("site_notes", Text),
    opt("active", Boolean),
];

const WOUND_FIELDS: &[FieldSpec] = &[
    req("wound_type", Text),
    opt("stage", Text),
    opt("length_cm", Decimal),
    opt("width_cm", Decimal),
    opt("depth_cm", Decimal),
    opt("description", Text),
    opt("identified_at", DateTime),
];

const ORDER_FIELDS: &[FieldSpec] = &[
    req("order_text", Text),
    opt("order_type", Text),
    opt("priority", Text),
    opt("status", Text),
    opt("ordered_by", Text),
    opt("ordered_at", DateTime),
    opt("acknowledged", Boolean),
];

const ASSESSMENT_FIELDS: &[FieldSpec] = &[
    req("assessment_type", Text),
    opt("findings", Text),
    opt("score", Integer),
    opt("assessed_by", Text),
    opt("assessed_at", DateTime),
];

const DIRECTIVE_FIELDS: &[FieldSpec] = &[
    req("directive_type", Text),
    opt("details", Text),
    opt("effective_date", Date),
    opt("witnessed_by", Text),
];

const ADMINISTRATION_FIELDS: &[FieldSpec] = &[
    req("administered_at", DateTime),
    opt("dose_given", Text),
    opt("administered_by", Text),
    opt("notes", Text),
    opt("barcode_scanned", Boolean),
];

const WOUND_ASSESSMENT_FIELDS: &[FieldSpec] = &[
    req("assessed_at", DateTime),
    opt("healing_progress", Text),
    opt("drainage", Text),
    opt("length_cm", Decimal),
    opt("width_cm", Decimal),
    opt("depth_cm", Decimal),
    opt("assessed_by", Text),
];

const STANDARD: &[EntityDescriptor] = &[
    EntityDescriptor {
        kind: EntityKind::Patient,
        scope: Scope::Tenant,
        fields: PATIENT_FIELDS,
        depends_on: &[],
        capability: None,
        sync: SyncStrategy::Match,
    },
    EntityDescriptor {
        kind: EntityKind::BodyLocation,
        scope: Scope::Tenant,
        fields: BODY_LOCATION_FIELDS,
        depends_on: &[],
        capability: Some(Capability::BodyLocations),
        sync: SyncStrategy::Replace,
    },
    EntityDescriptor {
        kind: EntityKind::Medication,
        scope: Scope::Patient,
        fields: MEDICATION_FIELDS,
        depends_on: &[PATIENT_OWNER],
        capability: None,
        sync: SyncStrategy::Match,
    },
    EntityDescriptor {
        kind: EntityKind::Vital,
        scope: Scope::Patient,
        fields: VITAL_FIELDS,
        depends_on: &[PATIENT_OWNER],
        capability: None,
        sync: SyncStrategy::Replace,
    },
    EntityDescriptor {
        kind: EntityKind::Note,
        scope: Scope::Patient,
        fields: NOTE_FIELDS,
        depends_on: &[PATIENT_OWNER],
        capability: None,
        sync: SyncStrategy::Replace,
    },
    EntityDescriptor {
        kind: EntityKind::Alert,
        scope: Scope::Patient,
        fields: ALERT_FIELDS,
        depends_on: &[PATIENT_OWNER],
        capability: None,
        sync: SyncStrategy::Replace,
    },
    EntityDescriptor {
        kind: EntityKind::Device,
        scope: Scope::Patient,
        fields: DEVICE_FIELDS,
        depends_on: &[
            PATIENT_OWNER,
            Dependency {
                field: "body_location_id",
                kind: EntityKind::BodyLocation,
                required: false,
            },
        ],
        capability: Some(Capability::Devices),
        sync: SyncStrategy::Replace,
    },
    EntityDescriptor {
        kind: EntityKind::Wound,
        scope: Scope::Patient,
        fields: WOUND_FIELDS,
        depends_on: &[
            PATIENT_OWNER,
            Dependency {
                field: "body_location_id",
                kind: EntityKind::BodyLocation,
                required: false,
            },
        ],
        capability: Some(Capability::Wounds),
        sync: SyncStrategy::Replace,
    },
    EntityDescriptor {
        kind: EntityKind::Order,
        scope: Scope::Patient,
        fields: ORDER_FIELDS,
        depends_on: &[PATIENT_OWNER],
        capability: None,
        sync: SyncStrategy::Replace,
    },
    EntityDescriptor {
        kind: EntityKind::Assessment,
        scope: Scope::Patient,
        fields: ASSESSMENT_FIELDS,
        depends_on: &[PATIENT_OWNER],
        capability: None,
        sync: SyncStrategy::Replace,
    },
    EntityDescriptor {
        kind: EntityKind::Directive,
        scope: Scope::Patient,
        fields: DIRECTIVE_FIELDS,
        depends_on: &[PATIENT_OWNER],
        capability: Some(Capability::AdvanceDirectives),
        sync: SyncStrategy::Replace,
    },
    EntityDescriptor {
        kind: EntityKind::Administration,
        scope: Scope::Patient,
        fields: ADMINISTRATION_FIELDS,
        depends_on: &[
            PATIENT_OWNER,
            Dependency {
                field: "medication_id",
                kind: EntityKind::Medication,
                required: true,
            },
        ],
        capability: None,
        sync: SyncStrategy::Preserve,
    },
    EntityDescriptor {
        kind: EntityKind::WoundAssessment,
        scope: Scope::Patient,
        fields: WOUND_ASSESSMENT_FIELDS,
        depends_on: &[
            PATIENT_OWNER,
            Dependency {
                field: "wound_id",
                kind: EntityKind::Wound,
                required: true,
            },
        ],
        capability: Some(Capability::Wounds),
        sync: SyncStrategy::Replace,
    },
];

/// The set of optional capabilities available in the connected schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCapabilities {
    enabled: BTreeSet<Capability>,
}

impl SchemaCapabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            enabled: [
                Capability::BodyLocations,
                Capability::Devices,
                Capability::Wounds,
                Capability::AdvanceDirectives,
            ]
            .into_iter()
            .collect(),
        }
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.enabled.insert(capability);
        self
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.enabled.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.enabled.iter().copied()
    }
}

/// Validated entity registry bound to a schema revision's capabilities.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    descriptors: BTreeMap<EntityKind, EntityDescriptor>,
    order: Vec<EntityKind>,
    capabilities: SchemaCapabilities,
}

impl EntityRegistry {
    /// The built-in patient-care entity set.
    pub fn standard(capabilities: SchemaCapabilities) -> CoreResult<Self> {
        Self::new(STANDARD.to_vec(), capabilities)
    }

    pub fn new(
        descriptors: Vec<EntityDescriptor>,
        capabilities: SchemaCapabilities,
    ) -> CoreResult<Self> {
        let declared: Vec<EntityKind> = descriptors.iter().map(|d| d.kind).collect();
        let mut map = BTreeMap::new();
        for descriptor in descriptors {
            if map.insert(descriptor.kind, descriptor).is_some() {
                return Err(CoreError::Internal(
                    "entity kind registered twice".into(),
                ));
            }
        }
        let order = topological_order(&declared, &map)?;
        Ok(Self {
            descriptors: map,
            order,
            capabilities,
        })
    }

    pub fn capabilities(&self) -> &SchemaCapabilities {
        &self.capabilities
    }

    pub fn descriptor(&self, kind: EntityKind) -> CoreResult<&EntityDescriptor> {
        self.descriptors
            .get(&kind)
            .ok_or_else(|| CoreError::Internal(format!("entity kind {kind} is not registered")))
    }

    /// Whether the connected schema has a table for `kind`.
    pub fn is_supported(&self, kind: EntityKind) -> bool {
        match self.descriptors.get(&kind) {
            Some(d) => d.capability.is_none_or(|c| self.capabilities.contains(c)),
            None => false,
        }
    }

    /// Every registered kind, parents before dependents.
    pub fn processing_order(&self) -> &[EntityKind] {
        &self.order
    }

    /// Supported kinds, parents before dependents.
    pub fn supported_order(&self) -> Vec<EntityKind> {
        self.order
            .iter()
            .copied()
            .filter(|k| self.is_supported(*k))
            .collect()
    }

    /// Supported kinds, dependents before parents. Patients come last.
    pub fn teardown_order(&self) -> Vec<EntityKind> {
        let mut order = self.supported_order();
        order.reverse();
        order
    }

    pub fn kinds_with_strategy(&self, strategy: SyncStrategy) -> Vec<EntityKind> {
        self.supported_order()
            .into_iter()
            .filter(|k| self.descriptors[k].sync == strategy)
            .collect()
    }
}

/// Kahn's algorithm; ties are broken by declaration order so the result
/// is deterministic.
fn topological_order(
    declared: &[EntityKind],
    descriptors: &BTreeMap<EntityKind, EntityDescriptor>,
) -> CoreResult<Vec<EntityKind>> {
    let mut remaining: BTreeMap<EntityKind, BTreeSet<EntityKind>> = BTreeMap::new();
    for descriptor in descriptors.values() {
        let mut parents = BTreeSet::new();
        for dep in descriptor.depends_on {
            if !descriptors.contains_key(&dep.kind) {
                return Err(CoreError::Internal(format!(
                    "{} depends on unregistered kind {}",
                    descriptor.kind, dep.kind
                )));
            }
            if dep.kind != descriptor.kind {
                parents.insert(dep.kind);
            }
        }
        remaining.insert(descriptor.kind, parents);
    }

    let mut order = Vec::with_capacity(declared.len());
    while order.len() < declared.len() {
        let next = declared
            .iter()
            .copied()
            .find(|k| remaining.get(k).is_some_and(|parents| parents.is_empty()));
        let Some(kind) = next else {
            let stuck: Vec<String> = remaining.keys().map(ToString::to_string).collect();
            return Err(CoreError::Internal(format!(
                "entity dependency cycle among: {}",
                stuck.join(", ")
            )));
        };
        remaining.remove(&kind);
        for parents in remaining.values_mut() {
            parents.remove(&kind);
        }
        order.push(kind);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[EntityKind], kind: EntityKind) -> usize {
        order.iter().position(|k| *k == kind).unwrap()
    }

    #[test]
    fn parents_precede_dependents() {
        let registry = EntityRegistry::standard(SchemaCapabilities::all()).unwrap();
        let order = registry.processing_order();
        assert_eq!(order.len(), EntityKind::ALL.len());
        for kind in order {
            let descriptor = registry.descriptor(*kind).unwrap();
            for dep in descriptor.depends_on {
                assert!(
                    position(order, dep.kind) < position(order, *kind),
                    "{} must come before {}",
                    dep.kind,
                    kind
                );
            }
        }
        assert_eq!(order[0], EntityKind::Patient);
    }

    #[test]
    fn teardown_deletes_patients_last() {
        let registry = EntityRegistry::standard(SchemaCapabilities::all()).unwrap();
        let order = registry.teardown_order();
        assert_eq!(order.last(), Some(&EntityKind::Patient));
        assert!(
            position(&order, EntityKind::Administration)
                < position(&order, EntityKind::Medication)
        );
    }

    #[test]
    fn optional_kinds_follow_capabilities() {
        let registry = EntityRegistry::standard(SchemaCapabilities::none()).unwrap();
        assert!(registry.is_supported(EntityKind::Medication));
        assert!(!registry.is_supported(EntityKind::Wound));
        assert!(!registry.is_supported(EntityKind::WoundAssessment));
        assert!(!registry.supported_order().contains(&EntityKind::Device));

        let registry = EntityRegistry::standard(
            SchemaCapabilities::none().with(Capability::Wounds),
        )
        .unwrap();
        assert!(registry.is_supported(EntityKind::WoundAssessment));
        assert!(!registry.is_supported(EntityKind::Device));
    }

    #[test]
    fn cycles_are_rejected() {
        const A_DEPS: &[Dependency] = &[Dependency {
            field: "note_id",
            kind: EntityKind::Note,
            required: true,
        }];
        const B_DEPS: &[Dependency] = &[Dependency {
            field: "alert_id",
            kind: EntityKind::Alert,
            required: true,
        }];
        let descriptors = vec![
            EntityDescriptor {
                kind: EntityKind::Alert,
                scope: Scope::Tenant,
                fields: &[],
                depends_on: A_DEPS,
                capability: None,
                sync: SyncStrategy::Replace,
            },
            EntityDescriptor {
                kind: EntityKind::Note,
                scope: Scope::Tenant,
                fields: &[],
                depends_on: B_DEPS,
                capability: None,
                sync: SyncStrategy::Replace,
            },
        ];
        let err = EntityRegistry::new(descriptors, SchemaCapabilities::all()).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn snapshot_keys_round_trip_through_serde() {
        for kind in EntityKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::json!(kind.snapshot_key()));
        }
    }

    #[test]
    fn sync_strategies() {
        let registry = EntityRegistry::standard(SchemaCapabilities::all()).unwrap();
        assert_eq!(
            registry.kinds_with_strategy(SyncStrategy::Match),
            vec![EntityKind::Patient, EntityKind::Medication]
        );
        assert_eq!(
            registry.kinds_with_strategy(SyncStrategy::Preserve),
            vec![EntityKind::Administration]
        );
    }
}
