//! Patient-care entity rows and the business keys used to match them
//! across tenants that do not share ids.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::registry::{BARCODE, EntityKind, PATIENT_REF, TEMPLATE_KEY};

/// A stored row of any registered entity kind.
///
/// `fields` holds the coerced, schema-shaped values. Reference fields
/// (`patient_id`, `medication_id`, ...) hold UUID strings of entities in
/// the same tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kind: EntityKind,
    pub fields: Map<String, Value>,
}

impl EntityRecord {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn reference(&self, field: &str) -> Option<Uuid> {
        self.text(field).and_then(|s| Uuid::parse_str(s).ok())
    }

    pub fn patient_id(&self) -> Option<Uuid> {
        self.reference(PATIENT_REF)
    }

    pub fn template_key(&self) -> Option<Uuid> {
        self.reference(TEMPLATE_KEY)
    }

    pub fn barcode(&self) -> Option<&str> {
        self.text(BARCODE)
    }

    /// Loosely-typed document form used inside snapshots: the fields plus
    /// the row's `id`.
    pub fn to_document(&self) -> Value {
        let mut doc = self.fields.clone();
        doc.insert("id".into(), Value::String(self.id.to_string()));
        Value::Object(doc)
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Identity of a patient independent of its id or barcode.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatientKey {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
}

impl PatientKey {
    pub fn new(first_name: &str, last_name: &str, date_of_birth: &str) -> Self {
        Self {
            first_name: normalize(first_name),
            last_name: normalize(last_name),
            date_of_birth: date_of_birth.trim().to_string(),
        }
    }

    pub fn from_fields(fields: &Map<String, Value>) -> Option<Self> {
        let get = |name: &str| fields.get(name).and_then(Value::as_str);
        Some(Self::new(
            get("first_name")?,
            get("last_name")?,
            get("date_of_birth")?,
        ))
    }
}

impl fmt::Display for PatientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.first_name, self.last_name, self.date_of_birth
        )
    }
}

/// Identity of a medication order: owning patient plus drug, dose and route.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MedicationKey {
    pub patient: PatientKey,
    pub name: String,
    pub dosage: String,
    pub route: String,
}

impl MedicationKey {
    pub fn from_fields(patient: PatientKey, fields: &Map<String, Value>) -> Option<Self> {
        let get = |name: &str| fields.get(name).and_then(Value::as_str).map(normalize);
        Some(Self {
            patient,
            name: get("name")?,
            dosage: get("dosage")?,
            route: get("route")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn patient_key_ignores_case_and_spacing() {
        let a = PatientKey::from_fields(&fields(json!({
            "first_name": "Mary ", "last_name": "O'Neil", "date_of_birth": "1950-02-03"
        })))
        .unwrap();
        let b = PatientKey::new("mary", "o'neil", "1950-02-03");
        assert_eq!(a, b);
    }

    #[test]
    fn medication_key_requires_name_dose_route() {
        let patient = PatientKey::new("A", "B", "2000-01-01");
        assert!(
            MedicationKey::from_fields(patient.clone(), &fields(json!({"name": "Heparin"})))
                .is_none()
        );
        let key = MedicationKey::from_fields(
            patient,
            &fields(json!({"name": "Heparin", "dosage": "5000  units", "route": "SubQ"})),
        )
        .unwrap();
        assert_eq!(key.dosage, "5000 units");
        assert_eq!(key.route, "subq");
    }

    #[test]
    fn document_form_includes_id() {
        let record = EntityRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            kind: EntityKind::Note,
            fields: fields(json!({"content": "stable overnight"})),
        };
        let doc = record.to_document();
        assert_eq!(doc["id"], json!(record.id.to_string()));
        assert_eq!(doc["content"], json!("stable overnight"));
    }
}
