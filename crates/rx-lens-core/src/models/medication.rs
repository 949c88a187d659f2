//! Medication catalog models.

use serde::{Deserialize, Serialize};

/// Default caution text for a newly cataloged medication.
pub const DEFAULT_CAUTION: &str = "Take as directed";

/// Default side-effects text for a newly cataloged medication.
pub const DEFAULT_SIDE_EFFECTS: &str = "Consult doctor";

/// A medication the patient has been prescribed, keyed by mentioned name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationRecord {
    pub id: u64,
    /// Mentioned (handwritten/brand) name
    pub name: String,
    /// Resolved generic name at first sighting
    pub description: String,
    pub caution: String,
    #[serde(rename = "sideEffects")]
    pub side_effects: String,
}

impl MedicationRecord {
    /// Create a catalog entry with the default caution and side-effect text.
    pub fn new(id: u64, name: String, description: String) -> Self {
        Self {
            id,
            name,
            description,
            caution: DEFAULT_CAUTION.to_string(),
            side_effects: DEFAULT_SIDE_EFFECTS.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let record = MedicationRecord::new(3, "Crocin".into(), "Paracetamol".into());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["name"], "Crocin");
        assert_eq!(json["description"], "Paracetamol");
        assert_eq!(json["caution"], DEFAULT_CAUTION);
        assert_eq!(json["sideEffects"], DEFAULT_SIDE_EFFECTS);
    }
}
