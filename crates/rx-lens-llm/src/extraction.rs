//! Medicine mention extraction from structured-text replies.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::TextGenerator;
use crate::prompts::make_structuring_prompt;

/// Line marker identifying a medication entry in the reply.
pub const MEDICINE_NAME_MARKER: &str = "Medicine Name";

/// Structured text substituted when the generative service fails.
pub const ERROR_PROCESSING_TEXT: &str = "Error processing text";

/// Labeled prescription sections plus the medicine names found in them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StructuredPrescription {
    /// Reply text as returned by the service (trimmed)
    pub structured_text: String,
    /// Medicine names in reply order; duplicates kept
    pub mentioned_medicines: Vec<String>,
}

impl StructuredPrescription {
    /// The degraded result used when structuring fails.
    pub fn failed() -> Self {
        Self {
            structured_text: ERROR_PROCESSING_TEXT.to_string(),
            mentioned_medicines: Vec::new(),
        }
    }

    /// Build from a reply, scraping its medicine mentions.
    pub fn from_reply(reply: &str) -> Self {
        let structured_text = reply.trim().to_string();
        let mentioned_medicines = parse_medicine_mentions(&structured_text);
        Self {
            structured_text,
            mentioned_medicines,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.structured_text == ERROR_PROCESSING_TEXT
    }
}

/// Scan a reply line by line; every line carrying the marker yields one entry.
pub fn parse_medicine_mentions(reply: &str) -> Vec<String> {
    reply.lines().filter_map(parse_medicine_line).collect()
}

/// Extract the medicine name from a single line, if it carries the marker.
///
/// The name is whatever follows the last marker occurrence, minus one
/// leading `:`, cut at the first comma and stripped of whitespace and
/// markdown emphasis.
pub fn parse_medicine_line(line: &str) -> Option<String> {
    let (_, after) = line.rsplit_once(MEDICINE_NAME_MARKER)?;
    let after = after.strip_prefix(':').unwrap_or(after);
    let name = after.split(',').next().unwrap_or_default();
    Some(
        name.trim_matches(|c: char| c.is_whitespace() || c == '*')
            .to_string(),
    )
}

/// Sends extracted text to a [`TextGenerator`] and parses the reply.
pub struct StructuringAdapter {
    generator: Box<dyn TextGenerator>,
}

impl StructuringAdapter {
    pub fn new(generator: Box<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Structure `text`. Never fails: service errors and empty replies
    /// degrade to [`StructuredPrescription::failed`].
    pub fn structure(&self, text: &str) -> StructuredPrescription {
        let prompt = make_structuring_prompt(text);

        match self.generator.generate(&prompt) {
            Ok(reply) if !reply.trim().is_empty() => {
                let structured = StructuredPrescription::from_reply(&reply);
                debug!(
                    stage = "structuring",
                    mentions = structured.mentioned_medicines.len(),
                    "Structured prescription text"
                );
                structured
            }
            Ok(_) => {
                warn!(stage = "structuring", "Generative service returned an empty reply");
                StructuredPrescription::failed()
            }
            Err(e) => {
                warn!(stage = "structuring", error = %e, "Generative service call failed");
                StructuredPrescription::failed()
            }
        }
    }
}
