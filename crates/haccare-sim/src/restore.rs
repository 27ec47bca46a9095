//! Materialization of a [`Snapshot`] into a target tenant.
//!
//! Restoring is split into planning and applying. [`RestoreEngine::plan`]
//! is pure: it walks the entity kinds in dependency order, assigns new
//! ids, rewrites references through an [`IdentifierMap`] and queues the
//! inserts into a [`ChangeSet`]. Invalid rows are skipped and reported per
//! kind; they never abort the restore. The lifecycle manager merges the
//! plan with its own mutations so the whole operation commits together.

use std::collections::BTreeMap;

use haccare_core::barcode::BarcodeGenerator;
use haccare_core::changeset::ChangeSet;
use haccare_core::coerce::{FieldError, shape_fields};
use haccare_core::error::CoreResult;
use haccare_core::id_map::IdentifierMap;
use haccare_core::models::entity::{EntityRecord, PatientKey};
use haccare_core::models::snapshot::{SNAPSHOT_FORMAT_VERSION, Snapshot};
use haccare_core::registry::{BARCODE, EntityDescriptor, EntityKind, EntityRegistry, TEMPLATE_KEY};
use haccare_core::repository::{ChangeSetWriter, Repositories, TenantRepository};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::LifecycleError;

#[derive(Debug, Clone)]
struct HeldCode {
    template_key: Option<Uuid>,
    patient: Option<PatientKey>,
    code: String,
}

/// Existing patient barcodes awaiting reuse.
///
/// Codes are claimed by `template_key` first, so a live patient keeps its
/// label even after its demographics were edited. Rows without a
/// `template_key` are claimed by business key. Each code is handed out at
/// most once, so patients sharing a business key keep one code each.
#[derive(Debug, Clone, Default)]
pub struct BarcodeMap {
    held: Vec<HeldCode>,
}

impl BarcodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the barcodes of live patient rows.
    pub fn from_patients(patients: &[EntityRecord]) -> Self {
        let held = patients
            .iter()
            .filter_map(|p| {
                Some(HeldCode {
                    template_key: p.template_key(),
                    patient: PatientKey::from_fields(&p.fields),
                    code: p.barcode()?.to_string(),
                })
            })
            .collect();
        Self { held }
    }

    /// Hold `code` for the patient restored from template row `template_key`.
    pub fn insert_for_template(&mut self, template_key: Uuid, code: impl Into<String>) {
        self.held.push(HeldCode {
            template_key: Some(template_key),
            patient: None,
            code: code.into(),
        });
    }

    /// Hold `code` for a patient known only by business key.
    pub fn insert(&mut self, key: PatientKey, code: impl Into<String>) {
        self.held.push(HeldCode {
            template_key: None,
            patient: Some(key),
            code: code.into(),
        });
    }

    /// Take the code held for a restored patient, if any.
    fn claim(&mut self, template_key: Uuid, patient: Option<&PatientKey>) -> Option<String> {
        let position = self
            .held
            .iter()
            .position(|h| h.template_key == Some(template_key))
            .or_else(|| {
                let patient = patient?;
                self.held
                    .iter()
                    .position(|h| h.template_key.is_none() && h.patient.as_ref() == Some(patient))
            })?;
        Some(self.held.remove(position).code)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    fn codes(&self) -> impl Iterator<Item = &str> {
        self.held.iter().map(|h| h.code.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Reuse barcodes from `barcodes` for patients holding one there.
    pub preserve_identifiers: bool,
    pub barcodes: Option<BarcodeMap>,
}

impl RestoreOptions {
    pub fn fresh() -> Self {
        Self::default()
    }

    pub fn preserving(barcodes: BarcodeMap) -> Self {
        Self {
            preserve_identifiers: true,
            barcodes: Some(barcodes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The row is not a JSON object.
    Malformed,
    /// The row has no parseable `id`.
    MissingIdentifier,
    /// Another row of the same kind already used this `id`.
    DuplicateIdentifier,
    /// A required reference does not resolve to a restored parent.
    UnresolvedReference,
    MissingField,
    Coercion,
    /// The connected schema has no table for this kind.
    UnsupportedKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    /// The row's `id` in the snapshot, when it had one.
    pub source_id: Option<String>,
    pub reason: SkipReason,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindReport {
    pub inserted: usize,
    pub skipped: Vec<SkippedRow>,
}

/// Per-kind outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub kinds: BTreeMap<EntityKind, KindReport>,
}

impl RestoreReport {
    pub fn inserted(&self, kind: EntityKind) -> usize {
        self.kinds.get(&kind).map_or(0, |r| r.inserted)
    }

    pub fn skipped(&self, kind: EntityKind) -> &[SkippedRow] {
        self.kinds
            .get(&kind)
            .map(|r| r.skipped.as_slice())
            .unwrap_or(&[])
    }

    pub fn total_inserted(&self) -> usize {
        self.kinds.values().map(|r| r.inserted).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.kinds.values().map(|r| r.skipped.len()).sum()
    }

    /// Inserted counts keyed by snapshot array name.
    pub fn inserted_counts(&self) -> BTreeMap<String, usize> {
        self.kinds
            .iter()
            .map(|(kind, r)| (kind.snapshot_key().to_string(), r.inserted))
            .collect()
    }
}

/// A planned restore: the inserts to apply plus what they will produce.
#[derive(Debug)]
pub struct RestorePlan {
    pub changes: ChangeSet,
    pub report: RestoreReport,
    pub id_map: IdentifierMap,
}

pub struct RestoreEngine<'a> {
    registry: &'a EntityRegistry,
    barcode_prefix: &'a str,
}

impl<'a> RestoreEngine<'a> {
    pub fn new(registry: &'a EntityRegistry, barcode_prefix: &'a str) -> Self {
        Self {
            registry,
            barcode_prefix,
        }
    }

    /// Plan a full restore of `snapshot` into `target_tenant_id`.
    pub fn plan(
        &self,
        target_tenant_id: Uuid,
        snapshot: &Snapshot,
        options: &RestoreOptions,
    ) -> CoreResult<RestorePlan> {
        let kinds = self.registry.processing_order().to_vec();
        self.plan_kinds(target_tenant_id, snapshot, options, &kinds, IdentifierMap::new())
    }

    /// Plan a restore of only `kinds`, resolving references through
    /// `id_map` first. Kinds are processed in registry order regardless of
    /// the order given.
    pub fn plan_kinds(
        &self,
        target_tenant_id: Uuid,
        snapshot: &Snapshot,
        options: &RestoreOptions,
        kinds: &[EntityKind],
        mut id_map: IdentifierMap,
    ) -> CoreResult<RestorePlan> {
        let format_version = snapshot.metadata.format_version;
        if format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(LifecycleError::UnsupportedSnapshotFormat {
                found: format_version,
                supported: SNAPSHOT_FORMAT_VERSION,
            }
            .into());
        }
        if !snapshot.verify_checksum() {
            warn!(
                source_tenant_id = %snapshot.metadata.source_tenant_id,
                "Snapshot checksum mismatch; restoring anyway"
            );
        }

        let mut barcodes = BarcodeGenerator::new(self.barcode_prefix);
        let mut preserved = match (&options.barcodes, options.preserve_identifiers) {
            (Some(map), true) => map.clone(),
            _ => BarcodeMap::new(),
        };
        for code in preserved.codes() {
            barcodes.reserve(code);
        }

        let mut changes = ChangeSet::new();
        let mut report = RestoreReport::default();

        for &kind in self.registry.processing_order() {
            if !kinds.contains(&kind) {
                continue;
            }
            let rows = snapshot.rows(kind);
            let mut kind_report = KindReport::default();

            if !self.registry.is_supported(kind) {
                if !rows.is_empty() {
                    warn!(%kind, rows = rows.len(), "Schema lacks table; skipping kind");
                }
                kind_report.skipped = rows
                    .iter()
                    .map(|row| SkippedRow {
                        source_id: source_id(row),
                        reason: SkipReason::UnsupportedKind,
                        detail: format!("{kind} is not available in this schema revision"),
                    })
                    .collect();
                report.kinds.insert(kind, kind_report);
                continue;
            }

            let descriptor = self.registry.descriptor(kind)?;
            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                let planned = plan_row(
                    descriptor,
                    target_tenant_id,
                    row,
                    &id_map,
                    &mut preserved,
                    &mut barcodes,
                )
                .and_then(|(old_id, record)| {
                    id_map
                        .insert(kind, old_id, record.id)
                        .map(|()| record)
                        .map_err(|dup| SkippedRow {
                            source_id: Some(old_id.to_string()),
                            reason: SkipReason::DuplicateIdentifier,
                            detail: format!("id already restored as {}", dup.existing),
                        })
                });
                match planned {
                    Ok(record) => records.push(record),
                    Err(skip) => {
                        warn!(
                            tenant_id = %target_tenant_id,
                            %kind,
                            source_id = skip.source_id.as_deref().unwrap_or("-"),
                            reason = ?skip.reason,
                            detail = %skip.detail,
                            "Skipping snapshot row"
                        );
                        kind_report.skipped.push(skip);
                    }
                }
            }

            kind_report.inserted = records.len();
            debug!(
                tenant_id = %target_tenant_id,
                %kind,
                inserted = kind_report.inserted,
                skipped = kind_report.skipped.len(),
                "Planned restore"
            );
            changes.insert_entities(kind, records);
            report.kinds.insert(kind, kind_report);
        }

        Ok(RestorePlan {
            changes,
            report,
            id_map,
        })
    }

    /// Restore `snapshot` into an existing tenant as one transaction.
    pub async fn restore<R: Repositories>(
        &self,
        repos: &R,
        target_tenant_id: Uuid,
        snapshot: &Snapshot,
        options: &RestoreOptions,
    ) -> CoreResult<RestoreReport> {
        repos.tenants().get_by_id(target_tenant_id).await?;
        let plan = self.plan(target_tenant_id, snapshot, options)?;
        repos.writer().apply(plan.changes).await?;
        info!(
            tenant_id = %target_tenant_id,
            inserted = plan.report.total_inserted(),
            skipped = plan.report.total_skipped(),
            "Restored snapshot"
        );
        Ok(plan.report)
    }
}

fn source_id(row: &Value) -> Option<String> {
    match row.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_id(value: Option<&Value>) -> Option<Uuid> {
    value
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Shape one snapshot row into a record for the target tenant, returning
/// it with the row's original id.
fn plan_row(
    descriptor: &EntityDescriptor,
    target_tenant_id: Uuid,
    row: &Value,
    id_map: &IdentifierMap,
    preserved: &mut BarcodeMap,
    barcodes: &mut BarcodeGenerator,
) -> Result<(Uuid, EntityRecord), SkippedRow> {
    let skip = |reason: SkipReason, detail: String| SkippedRow {
        source_id: source_id(row),
        reason,
        detail,
    };

    let Value::Object(document) = row else {
        return Err(skip(SkipReason::Malformed, "row is not an object".into()));
    };
    let old_id = parse_id(document.get("id"))
        .ok_or_else(|| skip(SkipReason::MissingIdentifier, "row has no valid id".into()))?;

    let mut fields: Map<String, Value> =
        shape_fields(document, descriptor.fields).map_err(|e| match e {
            FieldError::Missing(field) => {
                skip(SkipReason::MissingField, format!("required field '{field}' is empty"))
            }
            FieldError::Coercion(err) => skip(SkipReason::Coercion, err.to_string()),
        })?;

    for dep in descriptor.depends_on {
        let raw = document.get(dep.field);
        if is_blank(raw) {
            if dep.required {
                return Err(skip(
                    SkipReason::MissingField,
                    format!("required reference '{}' is empty", dep.field),
                ));
            }
            continue;
        }
        match parse_id(raw).and_then(|old| id_map.resolve(dep.kind, old)) {
            Some(new_parent) => {
                fields.insert(dep.field.into(), Value::String(new_parent.to_string()));
            }
            None if dep.required => {
                return Err(skip(
                    SkipReason::UnresolvedReference,
                    format!("'{}' does not resolve to a restored {}", dep.field, dep.kind),
                ));
            }
            None => {
                debug!(
                    kind = %descriptor.kind,
                    field = dep.field,
                    "Clearing unresolved optional reference"
                );
            }
        }
    }

    let template_key = parse_id(document.get(TEMPLATE_KEY)).unwrap_or(old_id);
    fields.insert(TEMPLATE_KEY.into(), Value::String(template_key.to_string()));

    if descriptor.kind == EntityKind::Patient {
        let patient = PatientKey::from_fields(&fields);
        let reused = preserved.claim(template_key, patient.as_ref());
        let code = reused.unwrap_or_else(|| barcodes.next_code());
        fields.insert(BARCODE.into(), Value::String(code));
    }

    Ok((
        old_id,
        EntityRecord {
            id: Uuid::new_v4(),
            tenant_id: target_tenant_id,
            kind: descriptor.kind,
            fields,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use haccare_core::changeset::Mutation;
    use haccare_core::registry::SchemaCapabilities;
    use serde_json::json;

    fn registry(caps: SchemaCapabilities) -> EntityRegistry {
        EntityRegistry::standard(caps).unwrap()
    }

    fn snapshot(entities: Value) -> Snapshot {
        let entities = serde_json::from_value(entities).unwrap();
        Snapshot::new(Uuid::new_v4(), None, entities)
    }

    fn inserted(plan: &RestorePlan, kind: EntityKind) -> Vec<EntityRecord> {
        plan.changes
            .mutations()
            .iter()
            .filter_map(|m| match m {
                Mutation::InsertEntities { kind: k, records } if *k == kind => Some(records.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    const P1: &str = "00000000-0000-4000-8000-000000000001";
    const P2: &str = "00000000-0000-4000-8000-000000000002";
    const M1: &str = "00000000-0000-4000-8000-0000000000a1";

    #[test]
    fn references_are_remapped_to_new_ids() {
        let registry = registry(SchemaCapabilities::all());
        let engine = RestoreEngine::new(&registry, "PT");
        let snap = snapshot(json!({
            "patients": [
                {"id": P1, "first_name": "Ann", "last_name": "Lee", "date_of_birth": "03/14/1961"},
            ],
            "medications": [
                {"id": M1, "patient_id": P1, "name": "Heparin", "dosage": "5000 units", "route": "SC"},
            ],
            "administrations": [
                {"id": Uuid::new_v4(), "patient_id": P1, "medication_id": M1,
                 "administered_at": "2025-05-20 08:00:00"},
            ],
        }));
        let target = Uuid::new_v4();
        let plan = engine.plan(target, &snap, &RestoreOptions::fresh()).unwrap();

        let patients = inserted(&plan, EntityKind::Patient);
        let meds = inserted(&plan, EntityKind::Medication);
        let admins = inserted(&plan, EntityKind::Administration);
        assert_eq!((patients.len(), meds.len(), admins.len()), (1, 1, 1));

        let new_patient = patients[0].id;
        assert_ne!(new_patient.to_string(), P1);
        assert_eq!(patients[0].text("date_of_birth"), Some("1961-03-14"));
        assert_eq!(meds[0].patient_id(), Some(new_patient));
        assert_eq!(admins[0].reference("medication_id"), Some(meds[0].id));
        assert!(meds.iter().chain(&admins).all(|r| r.tenant_id == target));

        assert_eq!(
            plan.id_map.resolve(EntityKind::Patient, Uuid::parse_str(P1).unwrap()),
            Some(new_patient)
        );
        assert_eq!(meds[0].template_key().map(|k| k.to_string()).as_deref(), Some(M1));
    }

    #[test]
    fn invalid_rows_are_skipped_with_reasons() {
        let registry = registry(SchemaCapabilities::all());
        let engine = RestoreEngine::new(&registry, "PT");
        let snap = snapshot(json!({
            "patients": [
                {"id": P1, "first_name": "Ann", "last_name": "Lee", "date_of_birth": "1961-03-14"},
                {"id": P1, "first_name": "Dup", "last_name": "Lee", "date_of_birth": "1961-03-14"},
                {"first_name": "NoId", "last_name": "Lee", "date_of_birth": "1961-03-14"},
                "not an object",
            ],
            "medications": [
                {"id": Uuid::new_v4(), "patient_id": P2, "name": "A", "dosage": "1", "route": "PO"},
                {"id": Uuid::new_v4(), "patient_id": P1, "name": "B", "route": "PO"},
                {"id": Uuid::new_v4(), "patient_id": P1, "name": "C", "dosage": "1", "route": "PO",
                 "prn": "sometimes"},
            ],
            "devices": [
                {"id": Uuid::new_v4(), "patient_id": P1, "device_type": "PIV",
                 "body_location_id": Uuid::new_v4()},
            ],
        }));
        let plan = engine
            .plan(Uuid::new_v4(), &snap, &RestoreOptions::fresh())
            .unwrap();

        let reasons = |kind| {
            plan.report
                .skipped(kind)
                .iter()
                .map(|s| s.reason)
                .collect::<Vec<_>>()
        };
        assert_eq!(plan.report.inserted(EntityKind::Patient), 1);
        assert_eq!(
            reasons(EntityKind::Patient),
            vec![
                SkipReason::DuplicateIdentifier,
                SkipReason::MissingIdentifier,
                SkipReason::Malformed
            ]
        );
        assert_eq!(plan.report.inserted(EntityKind::Medication), 0);
        assert_eq!(
            reasons(EntityKind::Medication),
            vec![
                SkipReason::UnresolvedReference,
                SkipReason::MissingField,
                SkipReason::Coercion
            ]
        );

        // Optional reference cleared, row kept.
        let devices = inserted(&plan, EntityKind::Device);
        assert_eq!(devices.len(), 1);
        assert!(!devices[0].fields.contains_key("body_location_id"));
    }

    #[test]
    fn barcodes_are_preserved_by_patient_key() {
        let registry = registry(SchemaCapabilities::all());
        let engine = RestoreEngine::new(&registry, "PT");
        let snap = snapshot(json!({
            "patients": [
                {"id": P1, "first_name": "Ann", "last_name": "Lee", "date_of_birth": "1961-03-14",
                 "barcode": "TEMPLATE-CODE"},
                {"id": P2, "first_name": "Bo", "last_name": "Park", "date_of_birth": "1950-07-01"},
            ],
        }));
        let mut existing = BarcodeMap::new();
        existing.insert(PatientKey::new("ANN", "Lee", "1961-03-14"), "PT0000000042");

        let plan = engine
            .plan(Uuid::new_v4(), &snap, &RestoreOptions::preserving(existing.clone()))
            .unwrap();
        let patients = inserted(&plan, EntityKind::Patient);
        assert_eq!(patients[0].barcode(), Some("PT0000000042"));
        let fresh = patients[1].barcode().unwrap();
        assert!(fresh.starts_with("PT") && fresh != "PT0000000042");

        // Without the flag the map is ignored and the template code replaced.
        let plan = engine
            .plan(
                Uuid::new_v4(),
                &snap,
                &RestoreOptions {
                    preserve_identifiers: false,
                    barcodes: Some(existing),
                },
            )
            .unwrap();
        let patients = inserted(&plan, EntityKind::Patient);
        assert_ne!(patients[0].barcode(), Some("PT0000000042"));
        assert_ne!(patients[0].barcode(), Some("TEMPLATE-CODE"));
    }

    #[test]
    fn barcodes_follow_template_key_over_demographics() {
        let registry = registry(SchemaCapabilities::all());
        let engine = RestoreEngine::new(&registry, "PT");
        let snap = snapshot(json!({
            "patients": [
                {"id": P1, "first_name": "Sam", "last_name": "Lee", "date_of_birth": "1961-03-14"},
                {"id": P2, "first_name": "Sam", "last_name": "Lee", "date_of_birth": "1961-03-14"},
            ],
        }));
        let live = |code: &str, template: &str, first: &str| EntityRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            kind: EntityKind::Patient,
            fields: json!({
                "first_name": first,
                "last_name": "Lee",
                "date_of_birth": "1961-03-14",
                "barcode": code,
                "template_key": template,
            })
            .as_object()
            .unwrap()
            .clone(),
        };
        // The second patient was renamed in the live simulation.
        let existing = BarcodeMap::from_patients(&[
            live("PT0000000001", P1, "Sam"),
            live("PT0000000002", P2, "Samuel"),
        ]);
        assert_eq!(existing.len(), 2);

        let plan = engine
            .plan(Uuid::new_v4(), &snap, &RestoreOptions::preserving(existing))
            .unwrap();
        let patients = inserted(&plan, EntityKind::Patient);
        assert_eq!(patients[0].barcode(), Some("PT0000000001"));
        assert_eq!(patients[1].barcode(), Some("PT0000000002"));
    }

    #[test]
    fn shared_business_keys_keep_one_code_each() {
        let registry = registry(SchemaCapabilities::all());
        let engine = RestoreEngine::new(&registry, "PT");
        let snap = snapshot(json!({
            "patients": [
                {"id": P1, "first_name": "Sam", "last_name": "Lee", "date_of_birth": "1961-03-14"},
                {"id": P2, "first_name": "Sam", "last_name": "Lee", "date_of_birth": "1961-03-14"},
            ],
        }));
        let mut existing = BarcodeMap::new();
        existing.insert(PatientKey::new("Sam", "Lee", "1961-03-14"), "PT0000000001");
        existing.insert(PatientKey::new("Sam", "Lee", "1961-03-14"), "PT0000000002");

        let plan = engine
            .plan(Uuid::new_v4(), &snap, &RestoreOptions::preserving(existing))
            .unwrap();
        let mut codes: Vec<String> = inserted(&plan, EntityKind::Patient)
            .iter()
            .filter_map(|p| p.barcode().map(str::to_string))
            .collect();
        codes.sort();
        assert_eq!(codes, ["PT0000000001", "PT0000000002"]);
    }

    #[test]
    fn kinds_missing_from_schema_are_reported() {
        let registry = registry(SchemaCapabilities::none());
        let engine = RestoreEngine::new(&registry, "PT");
        let snap = snapshot(json!({
            "patients": [
                {"id": P1, "first_name": "Ann", "last_name": "Lee", "date_of_birth": "1961-03-14"},
            ],
            "wounds": [
                {"id": Uuid::new_v4(), "patient_id": P1, "wound_type": "pressure"},
            ],
        }));
        let plan = engine
            .plan(Uuid::new_v4(), &snap, &RestoreOptions::fresh())
            .unwrap();
        assert_eq!(plan.report.inserted(EntityKind::Patient), 1);
        assert_eq!(
            plan.report.skipped(EntityKind::Wound)[0].reason,
            SkipReason::UnsupportedKind
        );
        assert!(inserted(&plan, EntityKind::Wound).is_empty());
    }

    #[test]
    fn template_key_is_carried_forward() {
        let registry = registry(SchemaCapabilities::all());
        let engine = RestoreEngine::new(&registry, "PT");
        let original = Uuid::new_v4();
        let snap = snapshot(json!({
            "patients": [
                {"id": P1, "first_name": "Ann", "last_name": "Lee", "date_of_birth": "1961-03-14",
                 "template_key": original},
            ],
        }));
        let plan = engine
            .plan(Uuid::new_v4(), &snap, &RestoreOptions::fresh())
            .unwrap();
        assert_eq!(
            inserted(&plan, EntityKind::Patient)[0].template_key(),
            Some(original)
        );
    }

    #[test]
    fn newer_snapshot_format_is_rejected() {
        let registry = registry(SchemaCapabilities::all());
        let engine = RestoreEngine::new(&registry, "PT");
        let mut snap = snapshot(json!({}));
        snap.metadata.format_version = SNAPSHOT_FORMAT_VERSION + 1;
        assert!(engine
            .plan(Uuid::new_v4(), &snap, &RestoreOptions::fresh())
            .is_err());
    }
}
