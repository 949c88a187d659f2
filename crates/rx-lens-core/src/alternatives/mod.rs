//! Brand-name alternatives for resolved drugs.
//!
//! Each drug is an independent task: identifier lookup → brand lookup →
//! tagged outcome. Outcomes are fanned in by drug name.

mod rxnav;

pub use rxnav::*;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::AlternativesMap;

/// Words never treated as drug names in free text.
const STOP_WORDS: [&str; 13] = [
    "take", "tablet", "for", "days", "and", "if", "the", "a", "of", "to", "patient", "should",
    "is",
];

/// Drug lookup errors.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Lookup timed out after {0}s")]
    Timeout(u64),

    #[error("Lookup service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Failed to parse lookup response: {0}")]
    ResponseParsing(String),
}

impl LookupError {
    /// Worth retrying: connection trouble, timeouts, server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            LookupError::Network(_) | LookupError::Timeout(_) => true,
            LookupError::Service { status, .. } => *status >= 500,
            LookupError::ResponseParsing(_) => false,
        }
    }
}

pub type LookupResult<T> = Result<T, LookupError>;

/// External drug identifier and brand-relation service.
pub trait DrugLookup: Send + Sync {
    /// Canonical identifier for a drug name, if the service knows it.
    fn find_identifier(&self, name: &str) -> LookupResult<Option<String>>;

    /// Brand names related to an identifier, in service order.
    fn brand_names(&self, identifier: &str) -> LookupResult<Vec<String>>;
}

/// Result of looking up one drug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Identifier found; brands may be empty
    Found(Vec<String>),
    /// Service has no identifier for the name
    NotFound,
    /// A lookup call failed
    Failed(String),
}

/// Looks up alternatives for a batch of drugs on a bounded worker pool.
#[derive(Clone)]
pub struct AlternativesResolver {
    lookup: Arc<dyn DrugLookup>,
    workers: usize,
}

impl AlternativesResolver {
    pub fn new(lookup: Arc<dyn DrugLookup>, workers: usize) -> Self {
        Self {
            lookup,
            workers: workers.max(1),
        }
    }

    /// Look up one (already normalized) drug name.
    pub fn lookup_one(&self, drug: &str) -> LookupOutcome {
        info!(drug = %drug, "Searching alternatives");
        let identifier = match self.lookup.find_identifier(drug) {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(drug = %drug, "Identifier not found");
                return LookupOutcome::NotFound;
            }
            Err(e) => {
                warn!(drug = %drug, stage = "identifier", error = %e, "Lookup failed");
                return LookupOutcome::Failed(e.to_string());
            }
        };

        match self.lookup.brand_names(&identifier) {
            Ok(brands) => {
                info!(drug = %drug, count = brands.len(), "Found alternatives");
                LookupOutcome::Found(brands)
            }
            Err(e) => {
                warn!(drug = %drug, rxcui = %identifier, stage = "brands", error = %e, "Lookup failed");
                LookupOutcome::Failed(e.to_string())
            }
        }
    }

    /// Tagged outcome per normalized drug name, in first-seen order.
    pub fn lookup_all(&self, names: &[String]) -> Vec<(String, LookupOutcome)> {
        let drugs = normalize_drug_names(names);
        if drugs.is_empty() {
            return Vec::new();
        }

        let next = AtomicUsize::new(0);
        let workers = self.workers.min(drugs.len());
        let (next, queue) = (&next, &drugs);

        let mut outcomes: Vec<(usize, LookupOutcome)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let i = next.fetch_add(1, Ordering::Relaxed);
                            let Some(drug) = queue.get(i) else { break };
                            done.push((i, self.lookup_one(drug)));
                        }
                        done
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        error!("Alternatives worker panicked; its drugs are omitted");
                        Vec::new()
                    })
                })
                .collect()
        });
        outcomes.sort_by_key(|(i, _)| *i);

        outcomes
            .into_iter()
            .map(|(i, outcome)| (drugs[i].clone(), outcome))
            .collect()
    }

    /// Alternatives map for a batch; drugs without a found identifier are absent.
    pub fn resolve(&self, names: &[String]) -> AlternativesMap {
        self.lookup_all(names)
            .into_iter()
            .filter_map(|(drug, outcome)| match outcome {
                LookupOutcome::Found(brands) => Some((drug, brands)),
                LookupOutcome::NotFound | LookupOutcome::Failed(_) => None,
            })
            .collect()
    }
}

/// Lowercase, trim, drop blanks and duplicates, keep first-seen order.
pub fn normalize_drug_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Candidate drug names from free prescription text.
///
/// Purely alphabetic words longer than three letters, lowercased, minus
/// common instruction words, deduplicated in first-seen order.
pub fn candidate_drug_names(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty() && word.chars().all(|c| c.is_ascii_alphabetic()))
        .map(|word| word.to_lowercase())
        .filter(|word| word.len() > 3 && !STOP_WORDS.contains(&word.as_str()))
        .filter(|word| seen.insert(word.clone()))
        .collect()
}

/// Scripted drug lookup for tests and offline runs.
#[derive(Default)]
pub struct MockDrugLookup {
    identifiers: HashMap<String, Result<Option<String>, String>>,
    brands: HashMap<String, Result<Vec<String>, String>>,
    calls: Mutex<Vec<String>>,
}

impl MockDrugLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Known drug with an identifier and brands.
    pub fn with_drug(mut self, name: &str, identifier: &str, brands: &[&str]) -> Self {
        self.identifiers
            .insert(name.to_string(), Ok(Some(identifier.to_string())));
        self.brands.insert(
            identifier.to_string(),
            Ok(brands.iter().map(|b| b.to_string()).collect()),
        );
        self
    }

    /// Identifier lookup for `name` fails with a network error.
    pub fn with_identifier_failure(mut self, name: &str) -> Self {
        self.identifiers
            .insert(name.to_string(), Err("connection reset".to_string()));
        self
    }

    /// Identifier found, brand lookup fails.
    pub fn with_brand_failure(mut self, name: &str, identifier: &str) -> Self {
        self.identifiers
            .insert(name.to_string(), Ok(Some(identifier.to_string())));
        self.brands
            .insert(identifier.to_string(), Err("service unavailable".to_string()));
        self
    }

    /// Names passed to `find_identifier` so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl DrugLookup for MockDrugLookup {
    fn find_identifier(&self, name: &str) -> LookupResult<Option<String>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(name.to_string());
        }
        match self.identifiers.get(name) {
            Some(Ok(id)) => Ok(id.clone()),
            Some(Err(e)) => Err(LookupError::Network(e.clone())),
            None => Ok(None),
        }
    }

    fn brand_names(&self, identifier: &str) -> LookupResult<Vec<String>> {
        match self.brands.get(identifier) {
            Some(Ok(brands)) => Ok(brands.clone()),
            Some(Err(e)) => Err(LookupError::Service {
                status: 503,
                body: e.clone(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

impl<T: DrugLookup + ?Sized> DrugLookup for Arc<T> {
    fn find_identifier(&self, name: &str) -> LookupResult<Option<String>> {
        (**self).find_identifier(name)
    }

    fn brand_names(&self, identifier: &str) -> LookupResult<Vec<String>> {
        (**self).brand_names(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn lookup() -> MockDrugLookup {
        MockDrugLookup::new()
            .with_drug("paracetamol", "161", &["Tylenol", "Panadol"])
            .with_drug("amoxicillin", "723", &[])
            .with_identifier_failure("ibuprofen")
            .with_brand_failure("warfarin", "11289")
    }

    #[test]
    fn test_found_not_found_and_failures() {
        let resolver = AlternativesResolver::new(Arc::new(lookup()), 2);
        let map = resolver.resolve(&names(&[
            "Paracetamol",
            "Amoxicillin",
            "Ibuprofen",
            "Xyzmedazole",
            "Warfarin",
        ]));

        assert_eq!(map.get("paracetamol"), Some(&names(&["Tylenol", "Panadol"])));
        assert_eq!(map.get("amoxicillin"), Some(&Vec::new()));
        assert!(!map.contains_key("ibuprofen"));
        assert!(!map.contains_key("xyzmedazole"));
        assert!(!map.contains_key("warfarin"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_outcomes_are_tagged_in_order() {
        let resolver = AlternativesResolver::new(Arc::new(lookup()), 3);
        let outcomes = resolver.lookup_all(&names(&["ibuprofen", "xyz", "paracetamol"]));

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].0, "ibuprofen");
        assert!(matches!(outcomes[0].1, LookupOutcome::Failed(_)));
        assert_eq!(outcomes[1].1, LookupOutcome::NotFound);
        assert_eq!(
            outcomes[2].1,
            LookupOutcome::Found(names(&["Tylenol", "Panadol"]))
        );
    }

    #[test]
    fn test_names_are_normalized_before_lookup() {
        let mock = Arc::new(lookup());
        let resolver = AlternativesResolver::new(mock.clone(), 1);
        resolver.resolve(&names(&["Paracetamol", " paracetamol ", "PARACETAMOL", ""]));
        assert_eq!(mock.calls(), vec!["paracetamol"]);
    }

    #[test]
    fn test_worker_count_does_not_change_result() {
        let batch = names(&["paracetamol", "amoxicillin", "ibuprofen", "warfarin", "xyz"]);
        let serial = AlternativesResolver::new(Arc::new(lookup()), 1).resolve(&batch);
        let parallel = AlternativesResolver::new(Arc::new(lookup()), 8).resolve(&batch);
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_empty_batch() {
        let resolver = AlternativesResolver::new(Arc::new(lookup()), 4);
        assert!(resolver.resolve(&[]).is_empty());
    }

    #[test]
    fn test_transient_errors() {
        assert!(LookupError::Network("reset".into()).is_transient());
        assert!(LookupError::Timeout(30).is_transient());
        assert!(LookupError::Service { status: 502, body: String::new() }.is_transient());
        assert!(!LookupError::Service { status: 404, body: String::new() }.is_transient());
        assert!(!LookupError::ResponseParsing("eof".into()).is_transient());
    }

    #[test]
    fn test_candidate_drug_names() {
        let text = "Take Amoxicillin 500mg tablet for 5 days. Patient should take \
                    amoxicillin and Paracetamol if the fever is high.";
        assert_eq!(
            candidate_drug_names(text),
            names(&["amoxicillin", "paracetamol", "fever", "high"])
        );
    }

    #[test]
    fn test_candidate_drug_names_skip_mixed_tokens() {
        assert!(candidate_drug_names("500mg x2 BD_od").is_empty());
    }
}
