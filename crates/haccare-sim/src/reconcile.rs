//! Business-key reconciliation of a live simulation against an updated
//! template snapshot.
//!
//! Entity ids are regenerated on every launch, so live rows are matched
//! to template rows by business key instead: patients by name and date of
//! birth, medications by owning patient plus name, dosage and route.
//! Patients must correspond one-to-one or the sync is refused. Medications
//! are diffed and only the delta is applied. Every other `Replace` kind is
//! wiped and restored from the template; `Preserve` kinds are left alone.

use std::collections::{BTreeMap, HashMap, HashSet};

use haccare_core::barcode::medication_label;
use haccare_core::changeset::{ChangeSet, Mutation};
use haccare_core::coerce::shape_fields;
use haccare_core::error::CoreResult;
use haccare_core::id_map::IdentifierMap;
use haccare_core::models::entity::{EntityRecord, MedicationKey, PatientKey};
use haccare_core::models::snapshot::Snapshot;
use haccare_core::registry::{
    EntityDescriptor, EntityKind, EntityRegistry, PATIENT_REF, SyncStrategy, TEMPLATE_KEY,
};
use haccare_core::repository::{EntityRepository, Repositories};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::restore::{RestoreEngine, RestoreOptions, RestoreReport};

fn row_id(row: &Value, field: &str) -> Option<Uuid> {
    row.get(field)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

/// Template patient ids mapped onto live patient ids.
#[derive(Debug, Clone, Default)]
pub struct PatientCorrespondence {
    pub template_to_live: BTreeMap<Uuid, Uuid>,
    template_keys: HashMap<Uuid, PatientKey>,
    live_keys: HashMap<Uuid, PatientKey>,
}

impl PatientCorrespondence {
    pub fn len(&self) -> usize {
        self.template_to_live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.template_to_live.is_empty()
    }
}

/// Match template patients to live patients one-to-one by business key.
///
/// Template rows that cannot be shaped are ignored, since a restore
/// would have skipped them too.
pub fn match_patients(
    descriptor: &EntityDescriptor,
    template_rows: &[Value],
    live: &[EntityRecord],
) -> Result<PatientCorrespondence, LifecycleError> {
    let mut template_by_key: BTreeMap<PatientKey, Uuid> = BTreeMap::new();
    let mut template_keys = HashMap::new();
    for row in template_rows {
        let (Some(document), Some(id)) = (row.as_object(), row_id(row, "id")) else {
            continue;
        };
        let Some(key) = shape_fields(document, descriptor.fields)
            .ok()
            .and_then(|fields| PatientKey::from_fields(&fields))
        else {
            continue;
        };
        if template_by_key.insert(key.clone(), id).is_some() {
            return Err(LifecycleError::PatientSetDiverged(format!(
                "template lists patient {key} more than once"
            )));
        }
        template_keys.insert(id, key);
    }

    let mut live_by_key: BTreeMap<PatientKey, Uuid> = BTreeMap::new();
    let mut live_keys = HashMap::new();
    for record in live {
        let Some(key) = PatientKey::from_fields(&record.fields) else {
            return Err(LifecycleError::PatientSetDiverged(format!(
                "live patient {} has no business key",
                record.id
            )));
        };
        if live_by_key.insert(key.clone(), record.id).is_some() {
            return Err(LifecycleError::PatientSetDiverged(format!(
                "simulation has patient {key} more than once"
            )));
        }
        live_keys.insert(record.id, key);
    }

    if let Some(key) = template_by_key.keys().find(|k| !live_by_key.contains_key(*k)) {
        return Err(LifecycleError::PatientSetDiverged(format!(
            "template patient {key} is not in the simulation"
        )));
    }
    if let Some(key) = live_by_key.keys().find(|k| !template_by_key.contains_key(*k)) {
        return Err(LifecycleError::PatientSetDiverged(format!(
            "simulation patient {key} is no longer in the template"
        )));
    }

    let template_to_live = template_by_key
        .iter()
        .map(|(key, template_id)| (*template_id, live_by_key[key]))
        .collect();
    Ok(PatientCorrespondence {
        template_to_live,
        template_keys,
        live_keys,
    })
}

/// A medication on either side of the comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicationEntry {
    pub id: Uuid,
    pub key: MedicationKey,
    pub template_key: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MedicationDelta {
    /// `(template id, live id)` pairs left untouched.
    pub paired: Vec<(Uuid, Uuid)>,
    /// Template ids to insert fresh.
    pub added: Vec<Uuid>,
    /// Live ids to delete.
    pub removed: Vec<Uuid>,
}

/// Pair template and live medications within each business-key group,
/// first by `template_key`, then by position.
pub fn pair_medications(template: &[MedicationEntry], live: &[MedicationEntry]) -> MedicationDelta {
    let mut groups: BTreeMap<&MedicationKey, (Vec<&MedicationEntry>, Vec<&MedicationEntry>)> =
        BTreeMap::new();
    for entry in template {
        groups.entry(&entry.key).or_default().0.push(entry);
    }
    for entry in live {
        groups.entry(&entry.key).or_default().1.push(entry);
    }

    let mut delta = MedicationDelta::default();
    for (template_rows, live_rows) in groups.into_values() {
        let mut available: Vec<Option<&MedicationEntry>> = live_rows.into_iter().map(Some).collect();
        let mut unmatched = Vec::new();

        for t in template_rows {
            let by_key = available.iter().position(|slot| {
                slot.is_some_and(|l| l.template_key.is_some() && l.template_key == t.template_key)
            });
            match by_key.and_then(|pos| available[pos].take()) {
                Some(l) => delta.paired.push((t.id, l.id)),
                None => unmatched.push(t),
            }
        }

        let mut remaining = available.into_iter().flatten();
        for t in unmatched {
            match remaining.next() {
                Some(l) => delta.paired.push((t.id, l.id)),
                None => delta.added.push(t.id),
            }
        }
        delta.removed.extend(remaining.map(|l| l.id));
    }
    delta
}

/// Everything a template sync will write, plus its counts.
#[derive(Debug)]
pub struct SyncPlan {
    pub changes: ChangeSet,
    pub medications_added: usize,
    pub medications_removed: usize,
    /// Labels for the newly inserted medications.
    pub medication_labels: Vec<String>,
    /// Rows restored for the wiped kinds.
    pub report: RestoreReport,
}

pub struct ReconciliationEngine<'a> {
    registry: &'a EntityRegistry,
    restore: RestoreEngine<'a>,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(registry: &'a EntityRegistry, barcode_prefix: &'a str) -> Self {
        Self {
            registry,
            restore: RestoreEngine::new(registry, barcode_prefix),
        }
    }

    /// Load the live patients and medications of `tenant_id` and plan the
    /// sync against `snapshot`.
    pub async fn plan_sync<R: Repositories>(
        &self,
        repos: &R,
        tenant_id: Uuid,
        snapshot: &Snapshot,
    ) -> CoreResult<SyncPlan> {
        let patients = repos.entities().list(tenant_id, EntityKind::Patient).await?;
        let medications = repos
            .entities()
            .list(tenant_id, EntityKind::Medication)
            .await?;
        self.plan(tenant_id, snapshot, &patients, &medications)
    }

    pub fn plan(
        &self,
        tenant_id: Uuid,
        snapshot: &Snapshot,
        live_patients: &[EntityRecord],
        live_medications: &[EntityRecord],
    ) -> CoreResult<SyncPlan> {
        let patient_descriptor = self.registry.descriptor(EntityKind::Patient)?;
        let patients = match_patients(
            patient_descriptor,
            snapshot.rows(EntityKind::Patient),
            live_patients,
        )?;

        let mut id_map = IdentifierMap::new();
        for (template_id, live_id) in &patients.template_to_live {
            id_map
                .insert(EntityKind::Patient, *template_id, *live_id)
                .map_err(LifecycleError::IdentifierCollision)?;
        }

        let medication_descriptor = self.registry.descriptor(EntityKind::Medication)?;
        let template_meds = template_medications(
            medication_descriptor,
            snapshot.rows(EntityKind::Medication),
            &patients,
        );
        let (live_meds, orphans) = live_medication_entries(live_medications, &patients);
        let mut delta = pair_medications(&template_meds, &live_meds);
        delta.removed.extend(orphans);

        for (template_id, live_id) in &delta.paired {
            id_map
                .insert(EntityKind::Medication, *template_id, *live_id)
                .map_err(LifecycleError::IdentifierCollision)?;
        }
        debug!(
            %tenant_id,
            paired = delta.paired.len(),
            added = delta.added.len(),
            removed = delta.removed.len(),
            "Medication delta"
        );

        let mut changes = ChangeSet::new();
        changes.delete_entities(EntityKind::Medication, delta.removed.clone());

        // Fresh rows for template medications with no live counterpart.
        let added: HashSet<Uuid> = delta.added.iter().copied().collect();
        let additions = snapshot.filtered(|kind, row| {
            kind == EntityKind::Medication && row_id(row, "id").is_some_and(|id| added.contains(&id))
        });
        let additions = self.restore.plan_kinds(
            tenant_id,
            &additions,
            &RestoreOptions::fresh(),
            &[EntityKind::Medication],
            id_map,
        )?;
        let medication_labels: Vec<String> = delta
            .added
            .iter()
            .filter_map(|old| additions.id_map.resolve(EntityKind::Medication, *old))
            .map(medication_label)
            .collect();
        let medications_added = additions.report.inserted(EntityKind::Medication);
        changes.append(additions.changes);

        // Wipe and restore the remaining student-work kinds.
        let replaced = self.registry.kinds_with_strategy(SyncStrategy::Replace);
        for kind in self.registry.teardown_order() {
            if replaced.contains(&kind) {
                changes.push(Mutation::PurgeEntities { kind, tenant_id });
            }
        }
        let baseline = self.restore.plan_kinds(
            tenant_id,
            snapshot,
            &RestoreOptions::fresh(),
            &replaced,
            additions.id_map,
        )?;
        changes.append(baseline.changes);

        info!(
            %tenant_id,
            patients = patients.len(),
            medications_added,
            medications_removed = delta.removed.len(),
            "Planned template sync"
        );
        Ok(SyncPlan {
            changes,
            medications_added,
            medications_removed: delta.removed.len(),
            medication_labels,
            report: baseline.report,
        })
    }
}

fn template_medications(
    descriptor: &EntityDescriptor,
    rows: &[Value],
    patients: &PatientCorrespondence,
) -> Vec<MedicationEntry> {
    rows.iter()
        .filter_map(|row| {
            let id = row_id(row, "id")?;
            let patient = patients.template_keys.get(&row_id(row, PATIENT_REF)?)?;
            let fields = shape_fields(row.as_object()?, descriptor.fields).ok()?;
            Some(MedicationEntry {
                id,
                key: MedicationKey::from_fields(patient.clone(), &fields)?,
                template_key: Some(row_id(row, TEMPLATE_KEY).unwrap_or(id)),
            })
        })
        .collect()
}

/// Live medications as entries, plus ids of rows that cannot be keyed.
fn live_medication_entries(
    records: &[EntityRecord],
    patients: &PatientCorrespondence,
) -> (Vec<MedicationEntry>, Vec<Uuid>) {
    let mut entries = Vec::with_capacity(records.len());
    let mut orphans = Vec::new();
    for record in records {
        let key = record
            .patient_id()
            .and_then(|p| patients.live_keys.get(&p))
            .and_then(|patient| MedicationKey::from_fields(patient.clone(), &record.fields));
        match key {
            Some(key) => entries.push(MedicationEntry {
                id: record.id,
                key,
                template_key: record.template_key(),
            }),
            None => orphans.push(record.id),
        }
    }
    (entries, orphans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use haccare_core::registry::SchemaCapabilities;
    use serde_json::{Map, json};

    fn med_key(patient: &str, name: &str) -> MedicationKey {
        MedicationKey {
            patient: PatientKey::new(patient, "Doe", "1970-01-01"),
            name: name.into(),
            dosage: "5 mg".into(),
            route: "iv".into(),
        }
    }

    fn entry(key: MedicationKey, template_key: Option<Uuid>) -> MedicationEntry {
        MedicationEntry {
            id: Uuid::new_v4(),
            key,
            template_key,
        }
    }

    #[test]
    fn identical_sets_produce_no_delta() {
        let t: Vec<_> = ["a", "b"]
            .iter()
            .map(|n| entry(med_key("ann", n), Some(Uuid::new_v4())))
            .collect();
        let l: Vec<_> = t
            .iter()
            .map(|e| entry(e.key.clone(), e.template_key))
            .collect();
        let delta = pair_medications(&t, &l);
        assert_eq!(delta.paired.len(), 2);
        assert!(delta.added.is_empty() && delta.removed.is_empty());
    }

    #[test]
    fn duplicates_pair_by_template_key_before_position() {
        let k1 = Uuid::new_v4();
        let k2 = Uuid::new_v4();
        let t1 = entry(med_key("ann", "insulin"), Some(k1));
        let t2 = entry(med_key("ann", "insulin"), Some(k2));
        // Live holds only the copy restored from t2, plus a student-added
        // duplicate with no template key.
        let l2 = entry(med_key("ann", "insulin"), Some(k2));
        let extra = entry(med_key("ann", "insulin"), None);

        let delta = pair_medications(&[t1.clone(), t2.clone()], &[extra.clone(), l2.clone()]);
        assert!(delta.paired.contains(&(t2.id, l2.id)));
        assert!(delta.paired.contains(&(t1.id, extra.id)));
        assert!(delta.added.is_empty() && delta.removed.is_empty());

        let delta = pair_medications(&[t1.clone(), t2.clone()], &[l2.clone()]);
        assert_eq!(delta.paired, vec![(t2.id, l2.id)]);
        assert_eq!(delta.added, vec![t1.id]);
    }

    #[test]
    fn unmatched_rows_become_adds_and_removes() {
        let t = vec![entry(med_key("ann", "heparin"), None)];
        let l = vec![entry(med_key("bo", "morphine"), None)];
        let delta = pair_medications(&t, &l);
        assert!(delta.paired.is_empty());
        assert_eq!(delta.added, vec![t[0].id]);
        assert_eq!(delta.removed, vec![l[0].id]);
    }

    fn live_patient(first: &str) -> EntityRecord {
        let mut fields = Map::new();
        fields.insert("first_name".into(), json!(first));
        fields.insert("last_name".into(), json!("Doe"));
        fields.insert("date_of_birth".into(), json!("1970-01-01"));
        EntityRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            kind: EntityKind::Patient,
            fields,
        }
    }

    fn template_patient(first: &str) -> Value {
        json!({"id": Uuid::new_v4(), "first_name": first, "last_name": "Doe",
               "date_of_birth": "01/01/1970"})
    }

    #[test]
    fn patients_match_after_normalization() {
        let registry = EntityRegistry::standard(SchemaCapabilities::all()).unwrap();
        let descriptor = registry.descriptor(EntityKind::Patient).unwrap();
        let template = vec![template_patient("  ANN "), template_patient("Bo")];
        let live = vec![live_patient("ann"), live_patient("bo")];
        let matched = match_patients(descriptor, &template, &live).unwrap();
        assert_eq!(matched.len(), 2);
    }

    #[test]
    fn patient_divergence_is_refused() {
        let registry = EntityRegistry::standard(SchemaCapabilities::all()).unwrap();
        let descriptor = registry.descriptor(EntityKind::Patient).unwrap();

        let added = vec![template_patient("Ann"), template_patient("Cy")];
        let err = match_patients(descriptor, &added, &[live_patient("Ann")]).unwrap_err();
        assert!(matches!(err, LifecycleError::PatientSetDiverged(_)));

        let removed = vec![template_patient("Ann")];
        let live = [live_patient("Ann"), live_patient("Bo")];
        assert!(match_patients(descriptor, &removed, &live).is_err());

        let duplicated = vec![template_patient("Ann"), template_patient("ann")];
        assert!(match_patients(descriptor, &duplicated, &[live_patient("Ann")]).is_err());
    }
}
