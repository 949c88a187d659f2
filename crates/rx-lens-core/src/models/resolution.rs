//! Name resolution models.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Generic name reported for a name outside the classifier vocabulary.
pub const UNKNOWN_MEDICINE: &str = "Unknown Medicine";

/// Generic name reported when the classifier fails on a known name.
pub const PREDICTION_ERROR: &str = "Prediction Error";

/// Lowercase drug name → brand names, in lookup order.
///
/// A drug whose identifier lookup failed has no key; a drug found with no
/// brands maps to an empty list.
pub type AlternativesMap = BTreeMap<String, Vec<String>>;

/// Outcome of resolving one mentioned name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Classifier prediction for a name in the vocabulary
    Generic(String),
    /// Name not in the vocabulary
    Unknown,
    /// Encoding, prediction or decoding failed
    PredictionError,
}

impl Resolution {
    pub fn as_str(&self) -> &str {
        match self {
            Resolution::Generic(name) => name,
            Resolution::Unknown => UNKNOWN_MEDICINE,
            Resolution::PredictionError => PREDICTION_ERROR,
        }
    }

    pub fn into_generic_name(self) -> String {
        match self {
            Resolution::Generic(name) => name,
            other => other.as_str().to_string(),
        }
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, Resolution::Generic(_))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mentioned medicine and the generic name it resolved to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedMedicine {
    /// Name as scraped from the structured text
    pub mentioned_name: String,
    /// Generic name, or one of the resolution sentinels
    pub generic_name: String,
}

impl ResolvedMedicine {
    pub fn new(mentioned_name: impl Into<String>, generic_name: impl Into<String>) -> Self {
        Self {
            mentioned_name: mentioned_name.into(),
            generic_name: generic_name.into(),
        }
    }
}

/// Mentioned name → generic name, in first-mention order.
///
/// Re-inserting a name keeps its original position and overwrites the
/// value. Serializes as a JSON object in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenericPredictions {
    entries: Vec<ResolvedMedicine>,
}

impl GenericPredictions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the prediction for `mentioned_name`.
    pub fn insert(&mut self, mentioned_name: impl Into<String>, generic_name: impl Into<String>) {
        let mentioned_name = mentioned_name.into();
        let generic_name = generic_name.into();
        match self
            .entries
            .iter_mut()
            .find(|e| e.mentioned_name == mentioned_name)
        {
            Some(existing) => existing.generic_name = generic_name,
            None => self.entries.push(ResolvedMedicine {
                mentioned_name,
                generic_name,
            }),
        }
    }

    pub fn get(&self, mentioned_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.mentioned_name == mentioned_name)
            .map(|e| e.generic_name.as_str())
    }

    pub fn contains(&self, mentioned_name: &str) -> bool {
        self.get(mentioned_name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResolvedMedicine> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[ResolvedMedicine] {
        &self.entries
    }

    /// Mentioned names in order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.mentioned_name.clone()).collect()
    }
}

impl FromIterator<ResolvedMedicine> for GenericPredictions {
    fn from_iter<I: IntoIterator<Item = ResolvedMedicine>>(iter: I) -> Self {
        let mut predictions = GenericPredictions::new();
        for medicine in iter {
            predictions.insert(medicine.mentioned_name, medicine.generic_name);
        }
        predictions
    }
}

impl<'a> IntoIterator for &'a GenericPredictions {
    type Item = &'a ResolvedMedicine;
    type IntoIter = std::slice::Iter<'a, ResolvedMedicine>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl Serialize for GenericPredictions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.mentioned_name, &entry.generic_name)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for GenericPredictions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PredictionsVisitor;

        impl<'de> Visitor<'de> for PredictionsVisitor {
            type Value = GenericPredictions;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of mentioned name to generic name")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut predictions = GenericPredictions::new();
                while let Some((name, generic)) = access.next_entry::<String, String>()? {
                    predictions.insert(name, generic);
                }
                Ok(predictions)
            }
        }

        deserializer.deserialize_map(PredictionsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_strings() {
        assert_eq!(Resolution::Generic("Acetaminophen".into()).as_str(), "Acetaminophen");
        assert_eq!(Resolution::Unknown.to_string(), UNKNOWN_MEDICINE);
        assert_eq!(Resolution::PredictionError.into_generic_name(), PREDICTION_ERROR);
    }

    #[test]
    fn test_predictions_keep_first_position_last_value() {
        let mut predictions = GenericPredictions::new();
        predictions.insert("Crocin", "Paracetamol");
        predictions.insert("Amoxil", "Amoxicillin");
        predictions.insert("Crocin", UNKNOWN_MEDICINE);

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions.names(), vec!["Crocin", "Amoxil"]);
        assert_eq!(predictions.get("Crocin"), Some(UNKNOWN_MEDICINE));
    }

    #[test]
    fn test_predictions_serialize_in_order() {
        let predictions: GenericPredictions = vec![
            ResolvedMedicine::new("Zyrtec", "Cetirizine"),
            ResolvedMedicine::new("Advil", "Ibuprofen"),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&predictions).unwrap();
        assert_eq!(json, r#"{"Zyrtec":"Cetirizine","Advil":"Ibuprofen"}"#);

        let parsed: GenericPredictions = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.names(), vec!["Zyrtec", "Advil"]);
    }

    #[test]
    fn test_empty_predictions_serialize_as_empty_object() {
        let json = serde_json::to_string(&GenericPredictions::new()).unwrap();
        assert_eq!(json, "{}");
    }
}
