//! Trained medicine-name classifier and its label encoders.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;

use super::{ModelError, ModelResult};

/// Closed-vocabulary classifier from mentioned names to generic names.
pub trait MedicineClassifier: Send + Sync {
    /// Every name the classifier was trained on.
    fn known_names(&self) -> &[String];

    /// Exact, case-sensitive vocabulary membership.
    fn is_known(&self, name: &str) -> bool;

    /// Name → input token.
    fn encode(&self, name: &str) -> ModelResult<usize>;

    /// Input token → output label.
    fn predict(&self, token: usize) -> ModelResult<usize>;

    /// Output label → generic name.
    fn decode(&self, label: usize) -> ModelResult<String>;
}

/// Fitted label encoder: an ordered class list and its reverse index.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct LabelEncoder {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

impl TryFrom<Vec<String>> for LabelEncoder {
    type Error = ModelError;

    fn try_from(classes: Vec<String>) -> Result<Self, Self::Error> {
        let mut index = HashMap::with_capacity(classes.len());
        for (i, class) in classes.iter().enumerate() {
            if index.insert(class.clone(), i).is_some() {
                return Err(ModelError::DuplicateClass(class.clone()));
            }
        }
        Ok(Self { classes, index })
    }
}

impl LabelEncoder {
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn contains(&self, class: &str) -> bool {
        self.index.contains_key(class)
    }

    pub fn transform(&self, class: &str) -> ModelResult<usize> {
        self.index
            .get(class)
            .copied()
            .ok_or_else(|| ModelError::UnknownClass(class.to_string()))
    }

    pub fn inverse_transform(&self, label: usize) -> ModelResult<String> {
        self.classes
            .get(label)
            .cloned()
            .ok_or(ModelError::LabelOutOfRange(label))
    }
}

/// Classifier file contents.
///
/// ```json
/// {
///   "medicine_name_classes": ["Amoxil", "Crocin"],
///   "generic_name_classes": ["Amoxicillin", "Paracetamol"],
///   "predictions": [0, 1]
/// }
/// ```
///
/// `predictions[token]` is the generic label predicted for medicine token
/// `token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainedModel {
    medicine_name_classes: LabelEncoder,
    generic_name_classes: LabelEncoder,
    predictions: Vec<usize>,
}

impl TrainedModel {
    /// Load a model file. Called once at startup.
    pub fn load<P: AsRef<Path>>(path: P) -> ModelResult<Self> {
        let body = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&body)
    }

    pub fn from_json(body: &str) -> ModelResult<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Fit both encoders from (mentioned name, generic name) pairs.
    ///
    /// Classes are sorted, as a fitted label encoder would hold them. A
    /// repeated mentioned name keeps its last generic name.
    pub fn from_pairs<I, A, B>(pairs: I) -> ModelResult<Self>
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let table: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(name, generic)| (name.into(), generic.into()))
            .collect();
        let generics: BTreeSet<&String> = table.values().collect();

        let generic_name_classes =
            LabelEncoder::try_from(generics.into_iter().cloned().collect::<Vec<_>>())?;
        let predictions = table
            .values()
            .map(|generic| generic_name_classes.transform(generic))
            .collect::<ModelResult<Vec<_>>>()?;
        let medicine_name_classes = LabelEncoder::try_from(table.into_keys().collect::<Vec<_>>())?;

        Ok(Self {
            medicine_name_classes,
            generic_name_classes,
            predictions,
        })
    }

    pub fn generic_names(&self) -> &[String] {
        self.generic_name_classes.classes()
    }
}

impl MedicineClassifier for TrainedModel {
    fn known_names(&self) -> &[String] {
        self.medicine_name_classes.classes()
    }

    fn is_known(&self, name: &str) -> bool {
        self.medicine_name_classes.contains(name)
    }

    fn encode(&self, name: &str) -> ModelResult<usize> {
        self.medicine_name_classes.transform(name)
    }

    fn predict(&self, token: usize) -> ModelResult<usize> {
        self.predictions
            .get(token)
            .copied()
            .ok_or(ModelError::TokenOutOfRange(token))
    }

    fn decode(&self, label: usize) -> ModelResult<String> {
        self.generic_name_classes.inverse_transform(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_JSON: &str = r#"{
        "medicine_name_classes": ["Amoxil", "Crocin", "Paracetamol"],
        "generic_name_classes": ["Amoxicillin", "Paracetamol"],
        "predictions": [0, 1, 1]
    }"#;

    #[test]
    fn test_load_from_json() {
        let model = TrainedModel::from_json(MODEL_JSON).unwrap();
        assert_eq!(model.known_names().len(), 3);
        assert!(model.is_known("Crocin"));
        assert!(!model.is_known("crocin"));

        let token = model.encode("Crocin").unwrap();
        let label = model.predict(token).unwrap();
        assert_eq!(model.decode(label).unwrap(), "Paracetamol");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medicine_model.json");
        std::fs::write(&path, MODEL_JSON).unwrap();

        let model = TrainedModel::load(&path).unwrap();
        assert_eq!(model.generic_names(), ["Amoxicillin", "Paracetamol"]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = TrainedModel::load("/nonexistent/model.json").unwrap_err();
        assert!(matches!(err, ModelError::Io(_)));
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let body = r#"{
            "medicine_name_classes": ["Crocin", "Crocin"],
            "generic_name_classes": ["Paracetamol"],
            "predictions": [0, 0]
        }"#;
        assert!(matches!(
            TrainedModel::from_json(body),
            Err(ModelError::Json(_))
        ));
    }

    #[test]
    fn test_out_of_range_lookups() {
        let model = TrainedModel::from_json(MODEL_JSON).unwrap();
        assert!(matches!(model.predict(9), Err(ModelError::TokenOutOfRange(9))));
        assert!(matches!(model.decode(5), Err(ModelError::LabelOutOfRange(5))));
        assert!(matches!(model.encode("Zzz"), Err(ModelError::UnknownClass(_))));
    }

    #[test]
    fn test_from_pairs_sorts_classes() {
        let model = TrainedModel::from_pairs([
            ("Tylenol", "Acetaminophen"),
            ("Advil", "Ibuprofen"),
            ("Panadol", "Acetaminophen"),
        ])
        .unwrap();

        assert_eq!(model.known_names(), ["Advil", "Panadol", "Tylenol"]);
        assert_eq!(model.generic_names(), ["Acetaminophen", "Ibuprofen"]);
        let label = model.predict(model.encode("Advil").unwrap()).unwrap();
        assert_eq!(model.decode(label).unwrap(), "Ibuprofen");
    }
}
