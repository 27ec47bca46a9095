//! Human-facing identifiers printed on patient wristbands and medication
//! labels.

use std::collections::HashSet;

use rand::Rng;
use uuid::Uuid;

/// Generates patient barcodes that are unique within one generator.
///
/// Barcodes are a prefix plus ten random digits, so two launches of the
/// same template practically never share a code.
#[derive(Debug)]
pub struct BarcodeGenerator {
    prefix: String,
    issued: HashSet<String>,
}

impl BarcodeGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            issued: HashSet::new(),
        }
    }

    /// Reserve an existing code so fresh codes never collide with it.
    pub fn reserve(&mut self, code: &str) {
        self.issued.insert(code.to_string());
    }

    pub fn next_code(&mut self) -> String {
        let mut rng = rand::rng();
        loop {
            let digits: u64 = rng.random_range(0..10_000_000_000);
            let code = format!("{}{digits:010}", self.prefix);
            if self.issued.insert(code.clone()) {
                return code;
            }
        }
    }
}

/// Medication labels are derived from the medication's id, so a newly
/// inserted medication always needs a newly printed label.
pub fn medication_label(id: Uuid) -> String {
    let hex = id.simple().to_string().to_uppercase();
    format!("MED-{}", &hex[..10])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_carry_prefix_and_are_unique() {
        let mut generator = BarcodeGenerator::new("PT");
        let codes: HashSet<String> = (0..500).map(|_| generator.next_code()).collect();
        assert_eq!(codes.len(), 500);
        for code in &codes {
            assert!(code.starts_with("PT"));
            assert_eq!(code.len(), 12);
            assert!(code[2..].chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn medication_label_is_stable_per_id() {
        let id = Uuid::new_v4();
        assert_eq!(medication_label(id), medication_label(id));
        assert_ne!(medication_label(id), medication_label(Uuid::new_v4()));
        assert!(medication_label(id).starts_with("MED-"));
    }
}
