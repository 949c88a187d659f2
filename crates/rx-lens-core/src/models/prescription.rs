//! Prescription upload and record models.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::resolution::GenericPredictions;

/// Upload extensions accepted by the pipeline (lowercase).
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "pdf"];

/// An uploaded prescription image, as handed over by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    /// Final path component of the uploaded name
    pub filename: String,
    /// Declared extension, lowercased (empty if none)
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl RawImage {
    /// Wrap uploaded bytes, reducing `filename` to its final component.
    pub fn new(filename: &str, bytes: Vec<u8>) -> Self {
        let filename = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        Self {
            filename,
            extension,
            bytes,
        }
    }

    /// Whether the declared extension is one the pipeline accepts.
    pub fn has_allowed_extension(&self) -> bool {
        ALLOWED_EXTENSIONS.contains(&self.extension.as_str())
    }
}

/// A processed prescription. Append-only once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionRecord {
    pub id: u64,
    pub filename: String,
    pub date: NaiveDate,
    pub structured_text: String,
    pub generic_predictions: GenericPredictions,
}
