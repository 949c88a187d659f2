//! Rx Lens Core Library
//!
//! Turns a photographed prescription into structured records: generic-name
//! predictions, a medication catalog, dose and refill reminders, and
//! brand-name alternatives.
//!
//! # Architecture
//!
//! ```text
//! Image → Normalize → OCR → Structure (LLM) → Resolve names (classifier)
//!                                                   │
//!                          ┌────────────────────────┼────────────────────────┐
//!                          ▼                        ▼                        ▼
//!                    Prescription            Medications +              Alternatives
//!                       record                 reminders              (RxNav lookups)
//! ```
//!
//! # Core Principle
//!
//! **A degraded stage never aborts a run.** OCR and structuring failures become
//! sentinel text, unknown or unpredictable names become sentinel generics, and
//! failed lookups are simply left out. Only an unusable upload or a record
//! store failure is reported as an error.
//!
//! # Modules
//!
//! - [`extraction`]: Image normalization and OCR
//! - [`resolver`]: Classifier-backed generic-name resolution
//! - [`alternatives`]: RxNav brand-name lookups
//! - [`pharmacies`]: Nearby pharmacy search
//! - [`reminders`]: Dose and refill reminder derivation
//! - [`assembler`]: Prescription and medication record assembly
//! - [`db`]: JSON-directory and SQLite record stores
//! - [`pipeline`]: End-to-end orchestration
//! - [`config`]: Environment configuration

pub mod alternatives;
pub mod assembler;
pub mod config;
pub mod db;
pub mod extraction;
pub mod models;
pub mod pharmacies;
pub mod pipeline;
pub mod reminders;
pub mod resolver;

// Re-export commonly used types
pub use alternatives::{AlternativesResolver, DrugLookup, LookupOutcome, RxNavClient};
pub use config::{Config, StoreBackend};
pub use db::{Collection, Database, JsonDirStore, RecordStore, Records};
pub use extraction::{ImageNormalizer, OcrEngine, TesseractCli, TextExtractor};
pub use models::{
    AlternativesMap, GenericPredictions, MedicationRecord, PrescriptionRecord, RawImage,
    Recurrence, ReminderRecord, Resolution, ResolvedMedicine,
};
pub use pharmacies::{Coordinates, GeoapifyClient, Pharmacy, PharmacyError, PharmacyFinder};
pub use pipeline::{open_chat, open_pharmacy_finder, Pipeline, PipelineError, UploadOutcome};
pub use resolver::{MedicineClassifier, NameResolver, TrainedModel};
pub use rx_lens_llm::{ChatReply, ChatSession, ChatTurn};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use rx_lens_llm::{ChatError, ChatRole};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum RxLensError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Service error: {0}")]
    ServiceError(String),
}

impl From<PipelineError> for RxLensError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::UnsupportedFormat(_) => RxLensError::InvalidInput(e.to_string()),
            PipelineError::Imaging(_) => RxLensError::ImageError(e.to_string()),
            PipelineError::Database(_) => RxLensError::DatabaseError(e.to_string()),
            PipelineError::Config(_) | PipelineError::Setup { .. } => {
                RxLensError::ConfigError(e.to_string())
            }
            PipelineError::Model(_) => RxLensError::ModelError(e.to_string()),
        }
    }
}

impl From<db::DbError> for RxLensError {
    fn from(e: db::DbError) -> Self {
        RxLensError::DatabaseError(e.to_string())
    }
}

impl From<config::ConfigError> for RxLensError {
    fn from(e: config::ConfigError) -> Self {
        RxLensError::ConfigError(e.to_string())
    }
}

impl From<ChatError> for RxLensError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::EmptyMessage => RxLensError::InvalidInput(e.to_string()),
            ChatError::Generation(_) => RxLensError::ServiceError(e.to_string()),
        }
    }
}

impl From<PharmacyError> for RxLensError {
    fn from(e: PharmacyError) -> Self {
        match e {
            PharmacyError::InvalidCoordinates { .. } => RxLensError::InvalidInput(e.to_string()),
            _ => RxLensError::ServiceError(e.to_string()),
        }
    }
}

fn parse_date(date: &str) -> Result<NaiveDate, RxLensError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| RxLensError::InvalidInput(format!("date {:?}: {}", date, e)))
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Build a pipeline from explicit settings.
#[uniffi::export]
pub fn open_pipeline(config: FfiConfig) -> Result<Arc<RxLensCore>, RxLensError> {
    let config = Config::try_from(config)?;
    open_core(&config)
}

/// Build a pipeline from environment variables.
#[uniffi::export]
pub fn open_pipeline_from_env() -> Result<Arc<RxLensCore>, RxLensError> {
    let config = Config::from_env()?;
    open_core(&config)
}

/// Pharmacy search is left off when no Geoapify key is configured.
fn open_core(config: &Config) -> Result<Arc<RxLensCore>, RxLensError> {
    let pipeline = Pipeline::from_config(config)?;
    let chat = open_chat(config)?;
    let pharmacies = match config.geoapify_api_key {
        Some(_) => Some(Box::new(open_pharmacy_finder(config)?) as Box<dyn PharmacyFinder>),
        None => None,
    };
    Ok(Arc::new(RxLensCore {
        pipeline,
        chat,
        pharmacies,
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe pipeline handle for FFI.
#[derive(uniffi::Object)]
pub struct RxLensCore {
    pipeline: Pipeline,
    chat: ChatSession,
    pharmacies: Option<Box<dyn PharmacyFinder>>,
}

#[uniffi::export]
impl RxLensCore {
    // =========================================================================
    // Pipeline Operations
    // =========================================================================

    /// Process an uploaded prescription image dated today.
    pub fn process_upload(
        &self,
        filename: String,
        bytes: Vec<u8>,
    ) -> Result<FfiUploadOutcome, RxLensError> {
        let image = RawImage::new(&filename, bytes);
        let outcome = self.pipeline.process_upload(&image, today())?;
        Ok(outcome.into())
    }

    /// Derive and store reminders for resolved medicines (`date` is YYYY-MM-DD).
    pub fn derive_reminders(
        &self,
        medicines: Vec<FfiResolvedMedicine>,
        date: String,
    ) -> Result<Vec<FfiReminder>, RxLensError> {
        let date = parse_date(&date)?;
        let medicines: Vec<ResolvedMedicine> = medicines.into_iter().map(|m| m.into()).collect();
        let reminders = self.pipeline.derive_reminders(&medicines, date)?;
        Ok(reminders.into_iter().map(|r| r.into()).collect())
    }

    /// Look up and store brand alternatives for drug names.
    pub fn resolve_alternatives(
        &self,
        drugs: Vec<String>,
    ) -> Result<Vec<FfiDrugAlternatives>, RxLensError> {
        let found = self.pipeline.resolve_alternatives(&drugs)?;
        Ok(alternatives_to_ffi(found))
    }

    /// Look up and store brand alternatives for drugs named in free text.
    pub fn resolve_alternatives_in_text(
        &self,
        text: String,
    ) -> Result<Vec<FfiDrugAlternatives>, RxLensError> {
        let found = self.pipeline.resolve_alternatives_in_text(&text)?;
        Ok(alternatives_to_ffi(found))
    }

    // =========================================================================
    // Assistant
    // =========================================================================

    /// Answer a chat message. The returned history includes both new turns
    /// and is passed back with the next message.
    pub fn chat(
        &self,
        message: String,
        history: Vec<FfiChatTurn>,
    ) -> Result<FfiChatReply, RxLensError> {
        let history = history
            .into_iter()
            .map(ChatTurn::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let reply = self.chat.send(&message, history)?;
        Ok(FfiChatReply {
            text: reply.text,
            history: reply.history.into_iter().map(|t| t.into()).collect(),
        })
    }

    /// Pharmacies near a position, nearest first.
    pub fn find_pharmacies(&self, lat: f64, lon: f64) -> Result<Vec<FfiPharmacy>, RxLensError> {
        let finder = self
            .pharmacies
            .as_ref()
            .ok_or_else(|| RxLensError::ConfigError("GEOAPIFY_API_KEY is not set".into()))?;
        let at = Coordinates::new(lat, lon)?;
        let pharmacies = finder.nearby(at)?;
        Ok(pharmacies.into_iter().map(|p| p.into()).collect())
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    pub fn list_prescriptions(&self) -> Result<Vec<FfiPrescription>, RxLensError> {
        let prescriptions = self.pipeline.records().prescriptions()?;
        Ok(prescriptions.into_iter().map(|p| p.into()).collect())
    }

    pub fn list_medications(&self) -> Result<Vec<FfiMedication>, RxLensError> {
        let medications = self.pipeline.records().medications()?;
        Ok(medications.into_iter().map(|m| m.into()).collect())
    }

    pub fn list_reminders(&self) -> Result<Vec<FfiReminder>, RxLensError> {
        let reminders = self.pipeline.records().reminders()?;
        Ok(reminders.into_iter().map(|r| r.into()).collect())
    }

    pub fn list_alternatives(&self) -> Result<Vec<FfiDrugAlternatives>, RxLensError> {
        Ok(alternatives_to_ffi(self.pipeline.records().alternatives()?))
    }

    /// Stored brand alternatives for one drug (case-insensitive).
    pub fn alternatives_for(&self, drug: String) -> Result<Vec<String>, RxLensError> {
        Ok(self.pipeline.records().alternatives_for(&drug)?)
    }

    /// Mark a reminder completed. Returns false if no such reminder.
    pub fn complete_reminder(&self, id: u64) -> Result<bool, RxLensError> {
        Ok(self.pipeline.records().complete_reminder(id)?)
    }

    pub fn delete_reminder(&self, id: u64) -> Result<bool, RxLensError> {
        Ok(self.pipeline.records().delete_reminder(id)?)
    }

    pub fn delete_medication(&self, id: u64) -> Result<bool, RxLensError> {
        Ok(self.pipeline.records().delete_medication(id)?)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe configuration. Empty strings fall back to defaults.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiConfig {
    pub data_dir: String,
    /// "json" or "sqlite"
    pub store: String,
    pub model_path: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_chat_model: String,
    pub gemini_base_url: String,
    pub rxnav_base_url: String,
    pub geoapify_api_key: String,
    pub geoapify_base_url: String,
    pub tesseract_path: String,
    pub ocr_language: String,
    pub request_timeout_secs: u64,
    pub ocr_timeout_secs: u64,
    pub lookup_retries: Option<u32>,
    pub lookup_workers: Option<u32>,
}

impl TryFrom<FfiConfig> for Config {
    type Error = RxLensError;

    fn try_from(ffi: FfiConfig) -> Result<Self, Self::Error> {
        let defaults = Config::default();
        let or = |value: String, default: String| if value.is_empty() { default } else { value };
        let store = if ffi.store.is_empty() {
            defaults.store
        } else {
            ffi.store.parse().map_err(RxLensError::InvalidInput)?
        };

        Ok(Config {
            data_dir: PathBuf::from(or(ffi.data_dir, defaults.data_dir.display().to_string())),
            store,
            model_path: PathBuf::from(or(
                ffi.model_path,
                defaults.model_path.display().to_string(),
            )),
            gemini_api_key: Some(ffi.gemini_api_key).filter(|k| !k.is_empty()),
            gemini_model: or(ffi.gemini_model, defaults.gemini_model),
            gemini_chat_model: or(ffi.gemini_chat_model, defaults.gemini_chat_model),
            gemini_base_url: or(ffi.gemini_base_url, defaults.gemini_base_url),
            rxnav_base_url: or(ffi.rxnav_base_url, defaults.rxnav_base_url),
            geoapify_api_key: Some(ffi.geoapify_api_key).filter(|k| !k.is_empty()),
            geoapify_base_url: or(ffi.geoapify_base_url, defaults.geoapify_base_url),
            tesseract_path: PathBuf::from(or(
                ffi.tesseract_path,
                defaults.tesseract_path.display().to_string(),
            )),
            ocr_language: or(ffi.ocr_language, defaults.ocr_language),
            request_timeout_secs: match ffi.request_timeout_secs {
                0 => defaults.request_timeout_secs,
                secs => secs,
            },
            ocr_timeout_secs: match ffi.ocr_timeout_secs {
                0 => defaults.ocr_timeout_secs,
                secs => secs,
            },
            lookup_retries: ffi.lookup_retries.unwrap_or(defaults.lookup_retries),
            lookup_workers: ffi
                .lookup_workers
                .map(|n| n as usize)
                .unwrap_or(defaults.lookup_workers),
            ..defaults
        })
    }
}

/// FFI-safe mentioned-name resolution.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiResolvedMedicine {
    pub mentioned_name: String,
    pub generic_name: String,
}

impl From<ResolvedMedicine> for FfiResolvedMedicine {
    fn from(m: ResolvedMedicine) -> Self {
        Self {
            mentioned_name: m.mentioned_name,
            generic_name: m.generic_name,
        }
    }
}

impl From<FfiResolvedMedicine> for ResolvedMedicine {
    fn from(m: FfiResolvedMedicine) -> Self {
        ResolvedMedicine {
            mentioned_name: m.mentioned_name,
            generic_name: m.generic_name,
        }
    }
}

fn predictions_to_ffi(predictions: GenericPredictions) -> Vec<FfiResolvedMedicine> {
    predictions.iter().cloned().map(|m| m.into()).collect()
}

/// FFI-safe brand alternatives for one drug.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDrugAlternatives {
    pub drug: String,
    pub brands: Vec<String>,
}

fn alternatives_to_ffi(map: AlternativesMap) -> Vec<FfiDrugAlternatives> {
    map.into_iter()
        .map(|(drug, brands)| FfiDrugAlternatives { drug, brands })
        .collect()
}

/// FFI-safe chat turn. `role` is "user" or "model".
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiChatTurn {
    pub role: String,
    pub text: String,
}

impl TryFrom<FfiChatTurn> for ChatTurn {
    type Error = RxLensError;

    fn try_from(turn: FfiChatTurn) -> Result<Self, Self::Error> {
        let role: ChatRole = turn.role.parse().map_err(RxLensError::InvalidInput)?;
        Ok(ChatTurn::new(role, turn.text))
    }
}

impl From<ChatTurn> for FfiChatTurn {
    fn from(turn: ChatTurn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            text: turn.text(),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiChatReply {
    pub text: String,
    pub history: Vec<FfiChatTurn>,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPharmacy {
    pub id: String,
    pub name: String,
    pub address: String,
}

impl From<Pharmacy> for FfiPharmacy {
    fn from(p: Pharmacy) -> Self {
        Self {
            id: p.id,
            name: p.name,
            address: p.address,
        }
    }
}

/// FFI-safe reminder.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReminder {
    pub id: u64,
    pub medication: String,
    pub title: String,
    /// YYYY-MM-DD
    pub date: String,
    /// HH:MM
    pub time: String,
    /// "daily" or "none"
    pub recurring: String,
    pub completed: bool,
}

impl From<ReminderRecord> for FfiReminder {
    fn from(r: ReminderRecord) -> Self {
        Self {
            id: r.id,
            medication: r.medication,
            title: r.title,
            date: r.date.format("%Y-%m-%d").to_string(),
            time: r.time,
            recurring: match r.recurring {
                Recurrence::Daily => "daily".to_string(),
                Recurrence::None => "none".to_string(),
            },
            completed: r.completed,
        }
    }
}

/// FFI-safe medication catalog entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedication {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub caution: String,
    pub side_effects: String,
}

impl From<MedicationRecord> for FfiMedication {
    fn from(m: MedicationRecord) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            caution: m.caution,
            side_effects: m.side_effects,
        }
    }
}

/// FFI-safe prescription record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescription {
    pub id: u64,
    pub filename: String,
    pub date: String,
    pub structured_text: String,
    pub generic_predictions: Vec<FfiResolvedMedicine>,
}

impl From<PrescriptionRecord> for FfiPrescription {
    fn from(p: PrescriptionRecord) -> Self {
        Self {
            id: p.id,
            filename: p.filename,
            date: p.date.format("%Y-%m-%d").to_string(),
            structured_text: p.structured_text,
            generic_predictions: predictions_to_ffi(p.generic_predictions),
        }
    }
}

/// FFI-safe upload result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUploadOutcome {
    pub prescription_id: u64,
    pub filename: String,
    pub extracted_text: String,
    pub structured_text: String,
    pub generic_predictions: Vec<FfiResolvedMedicine>,
    pub alternatives: Vec<FfiDrugAlternatives>,
    pub reminders: Vec<FfiReminder>,
}

impl From<UploadOutcome> for FfiUploadOutcome {
    fn from(o: UploadOutcome) -> Self {
        Self {
            prescription_id: o.prescription_id,
            filename: o.filename,
            extracted_text: o.extracted_text,
            structured_text: o.structured_text,
            generic_predictions: predictions_to_ffi(o.generic_predictions),
            alternatives: alternatives_to_ffi(o.alternatives),
            reminders: o.reminders.into_iter().map(|r| r.into()).collect(),
        }
    }
}
