//! Mentioned-name → generic-name resolution.
//!
//! Pipeline: vocabulary check → encode → classify → decode

mod model;

pub use model::*;

use std::sync::Arc;

use strsim::jaro_winkler;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{GenericPredictions, Resolution};

/// Minimum Jaro-Winkler similarity for a nearest-name suggestion.
pub const SUGGESTION_THRESHOLD: f64 = 0.85;

/// Classifier errors.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Cannot read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed model file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate encoder class: {0}")]
    DuplicateClass(String),

    #[error("Class not seen during training: {0}")]
    UnknownClass(String),

    #[error("No prediction for token {0}")]
    TokenOutOfRange(usize),

    #[error("No class for label {0}")]
    LabelOutOfRange(usize),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Resolves mentioned names against a loaded classifier.
///
/// Stateless per call; the classifier is read-only once loaded.
#[derive(Clone)]
pub struct NameResolver {
    classifier: Arc<dyn MedicineClassifier>,
}

impl NameResolver {
    pub fn new(classifier: Arc<dyn MedicineClassifier>) -> Self {
        Self { classifier }
    }

    /// Resolve one mentioned name. Total: never fails.
    pub fn resolve(&self, name: &str) -> Resolution {
        if !self.classifier.is_known(name) {
            debug!(stage = "resolution", medicine = %name, "Name outside vocabulary");
            return Resolution::Unknown;
        }

        match self.predict(name) {
            Ok(generic) => Resolution::Generic(generic),
            Err(e) => {
                warn!(stage = "resolution", medicine = %name, error = %e, "Prediction failed");
                Resolution::PredictionError
            }
        }
    }

    fn predict(&self, name: &str) -> ModelResult<String> {
        let token = self.classifier.encode(name)?;
        let label = self.classifier.predict(token)?;
        self.classifier.decode(label)
    }

    /// Resolve every mention, keyed by mentioned name in first-seen order.
    pub fn resolve_all(&self, names: &[String]) -> GenericPredictions {
        let mut predictions = GenericPredictions::new();
        for name in names {
            let resolution = self.resolve(name);
            if resolution == Resolution::Unknown {
                if let Some(closest) = self.suggest(name) {
                    debug!(medicine = %name, suggestion = %closest, "Closest known name");
                }
            }
            predictions.insert(name.clone(), resolution.into_generic_name());
        }
        predictions
    }

    /// Closest vocabulary name to `name`, if any is similar enough.
    pub fn suggest(&self, name: &str) -> Option<&str> {
        let needle = name.to_lowercase();
        self.classifier
            .known_names()
            .iter()
            .map(|known| (known, jaro_winkler(&needle, &known.to_lowercase())))
            .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(known, _)| known.as_str())
    }

    pub fn classifier(&self) -> &dyn MedicineClassifier {
        self.classifier.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UNKNOWN_MEDICINE;

    fn resolver() -> NameResolver {
        let model = TrainedModel::from_pairs([
            ("Paracetamol", "Acetaminophen"),
            ("Crocin", "Acetaminophen"),
            ("Amoxil", "Amoxicillin"),
        ])
        .unwrap();
        NameResolver::new(Arc::new(model))
    }

    #[test]
    fn test_resolve_known_name() {
        assert_eq!(
            resolver().resolve("Paracetamol"),
            Resolution::Generic("Acetaminophen".into())
        );
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        assert_eq!(resolver().resolve("paracetamol"), Resolution::Unknown);
    }

    #[test]
    fn test_resolve_unknown_name() {
        assert_eq!(resolver().resolve("Xyzmedazole"), Resolution::Unknown);
    }

    #[test]
    fn test_inconsistent_model_is_prediction_error() {
        // Two known names but only one prediction row.
        let model = TrainedModel::from_json(
            r#"{
                "medicine_name_classes": ["Amoxil", "Crocin"],
                "generic_name_classes": ["Amoxicillin"],
                "predictions": [0]
            }"#,
        )
        .unwrap();
        let resolver = NameResolver::new(Arc::new(model));

        assert_eq!(resolver.resolve("Amoxil"), Resolution::Generic("Amoxicillin".into()));
        assert_eq!(resolver.resolve("Crocin"), Resolution::PredictionError);
    }

    #[test]
    fn test_resolve_all_keeps_mention_order() {
        let names = vec![
            "Crocin".to_string(),
            "Xyzmedazole".to_string(),
            "Amoxil".to_string(),
            "Crocin".to_string(),
        ];
        let predictions = resolver().resolve_all(&names);

        assert_eq!(predictions.names(), vec!["Crocin", "Xyzmedazole", "Amoxil"]);
        assert_eq!(predictions.get("Crocin"), Some("Acetaminophen"));
        assert_eq!(predictions.get("Xyzmedazole"), Some(UNKNOWN_MEDICINE));
        assert_eq!(predictions.get("Amoxil"), Some("Amoxicillin"));
    }

    #[test]
    fn test_suggest_close_name() {
        let resolver = resolver();
        assert_eq!(resolver.suggest("Paracetamool"), Some("Paracetamol"));
        assert_eq!(resolver.suggest("amoxil"), Some("Amoxil"));
        assert_eq!(resolver.suggest("Warfarin"), None);
    }

    #[test]
    fn test_suggestion_does_not_change_resolution() {
        let resolver = resolver();
        let predictions = resolver.resolve_all(&["Paracetamool".to_string()]);
        assert_eq!(predictions.get("Paracetamool"), Some(UNKNOWN_MEDICINE));
    }
}
