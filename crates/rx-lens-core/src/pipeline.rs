//! Prescription resolution pipeline.
//!
//! ```text
//! RawImage → ImageNormalizer → TextExtractor → StructuringAdapter
//!          → NameResolver → AlternativesResolver
//!          → Records (prescription, medications, reminders, alternatives)
//! ```
//!
//! Only an undecodable or unsupported upload, or a record store failure,
//! aborts a run. Every other stage degrades to a sentinel. An upload's
//! records are saved in one batch, so a failed run stores nothing.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use rx_lens_llm::{ChatSession, GeminiClient, StructuringAdapter};

use crate::alternatives::{candidate_drug_names, AlternativesResolver, RetryPolicy, RxNavClient};
use crate::config::{Config, ConfigError};
use crate::db::{DbError, Records};
use crate::extraction::{ImageNormalizer, ImagingError, TesseractCli, TextExtractor};
use crate::models::{AlternativesMap, GenericPredictions, RawImage, ReminderRecord, ResolvedMedicine};
use crate::pharmacies::GeoapifyClient;
use crate::resolver::{MedicineClassifier, ModelError, NameResolver, TrainedModel};

/// Errors that abort a pipeline operation.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unsupported file type: {0:?}")]
    UnsupportedFormat(String),

    #[error("Image error: {0}")]
    Imaging(#[from] ImagingError),

    #[error("Record store error: {0}")]
    Database(#[from] DbError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Classifier error: {0}")]
    Model(#[from] ModelError),

    #[error("Cannot initialize {service} client: {reason}")]
    Setup { service: &'static str, reason: String },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// What one upload produced.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UploadOutcome {
    pub prescription_id: u64,
    pub filename: String,
    pub extracted_text: String,
    pub structured_text: String,
    pub generic_predictions: GenericPredictions,
    /// Alternatives looked up during this upload
    pub alternatives: AlternativesMap,
    pub reminders: Vec<ReminderRecord>,
}

/// The assembled stages plus the record store they write to.
pub struct Pipeline {
    normalizer: ImageNormalizer,
    extractor: TextExtractor,
    structurer: StructuringAdapter,
    resolver: NameResolver,
    alternatives: AlternativesResolver,
    records: Records,
}

impl Pipeline {
    pub fn new(
        normalizer: ImageNormalizer,
        extractor: TextExtractor,
        structurer: StructuringAdapter,
        resolver: NameResolver,
        alternatives: AlternativesResolver,
        records: Records,
    ) -> Self {
        Self {
            normalizer,
            extractor,
            structurer,
            resolver,
            alternatives,
            records,
        }
    }

    /// Build every stage from configuration: Tesseract, Gemini, the trained
    /// classifier, RxNav and the configured record store.
    pub fn from_config(config: &Config) -> PipelineResult<Self> {
        let api_key = config.require_api_key()?;

        let model = TrainedModel::load(&config.model_path)?;
        info!(
            path = %config.model_path.display(),
            vocabulary = model.known_names().len(),
            "Loaded medicine classifier"
        );

        let gemini = GeminiClient::new(
            &config.gemini_base_url,
            &config.gemini_model,
            api_key,
            config.request_timeout_secs,
        )
        .map_err(|e| PipelineError::Setup {
            service: "Gemini",
            reason: e.to_string(),
        })?;

        let retry = RetryPolicy {
            max_retries: config.lookup_retries,
            ..RetryPolicy::default()
        };
        let rxnav = RxNavClient::new(&config.rxnav_base_url, config.request_timeout_secs, retry)
            .map_err(|e| PipelineError::Setup {
                service: "RxNav",
                reason: e.to_string(),
            })?;

        let tesseract = TesseractCli::new(
            config.tesseract_path.clone(),
            config.ocr_language.clone(),
            config.ocr_timeout_secs,
        );
        if !tesseract.is_available() {
            warn!(path = %config.tesseract_path.display(), "Tesseract not found; OCR will fail");
        }

        Ok(Self::new(
            ImageNormalizer::default(),
            TextExtractor::new(Box::new(tesseract)),
            StructuringAdapter::new(Box::new(gemini)),
            NameResolver::new(Arc::new(model)),
            AlternativesResolver::new(Arc::new(rxnav), config.lookup_workers),
            config.open_records()?,
        ))
    }

    /// Run one upload end to end and persist its records.
    pub fn process_upload(&self, image: &RawImage, today: NaiveDate) -> PipelineResult<UploadOutcome> {
        let run_id = Uuid::new_v4();
        let span = info_span!("upload", run_id = %run_id, filename = %image.filename);
        let _entered = span.enter();

        if !image.has_allowed_extension() {
            warn!(extension = %image.extension, "Rejected upload");
            return Err(PipelineError::UnsupportedFormat(image.extension.clone()));
        }

        let raster = self.normalizer.normalize(&image.bytes).map_err(|e| {
            error!(stage = "normalize", error = %e, "Cannot prepare image");
            e
        })?;

        let extracted_text = self.extractor.extract(&raster);
        let structured = self.structurer.structure(&extracted_text);
        let predictions = self.resolver.resolve_all(&structured.mentioned_medicines);
        let alternatives = self.alternatives.resolve(&predictions.names());

        let committed = self.records.commit_upload(
            &image.filename,
            today,
            &structured.structured_text,
            &predictions,
            &alternatives,
        )?;

        info!(
            prescription_id = committed.prescription.id,
            medicines = predictions.len(),
            alternatives = alternatives.len(),
            "Upload processed"
        );

        Ok(UploadOutcome {
            prescription_id: committed.prescription.id,
            filename: image.filename.clone(),
            extracted_text,
            structured_text: structured.structured_text,
            generic_predictions: predictions,
            alternatives,
            reminders: committed.reminders,
        })
    }

    /// Derive dose and refill reminders and append them to the store.
    pub fn derive_reminders(
        &self,
        medicines: &[ResolvedMedicine],
        date: NaiveDate,
    ) -> PipelineResult<Vec<ReminderRecord>> {
        Ok(self.records.append_reminders(medicines, date)?)
    }

    /// Look up alternatives for `drugs` and merge them into the store.
    ///
    /// Returns this batch's lookups only.
    pub fn resolve_alternatives(&self, drugs: &[String]) -> PipelineResult<AlternativesMap> {
        let alternatives = self.alternatives.resolve(drugs);
        self.records.merge_alternatives(&alternatives)?;
        Ok(alternatives)
    }

    /// Same as [`Pipeline::resolve_alternatives`], for drug names found in
    /// free prescription text.
    pub fn resolve_alternatives_in_text(&self, text: &str) -> PipelineResult<AlternativesMap> {
        self.resolve_alternatives(&candidate_drug_names(text))
    }

    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    pub fn records(&self) -> &Records {
        &self.records
    }
}

/// Assistant chat backed by the configured Gemini chat model.
pub fn open_chat(config: &Config) -> PipelineResult<ChatSession> {
    let gemini = GeminiClient::new(
        &config.gemini_base_url,
        &config.gemini_chat_model,
        config.require_api_key()?,
        config.request_timeout_secs,
    )
    .map_err(|e| PipelineError::Setup {
        service: "Gemini",
        reason: e.to_string(),
    })?;
    Ok(ChatSession::new(Box::new(gemini)))
}

/// Geoapify pharmacy search client.
pub fn open_pharmacy_finder(config: &Config) -> PipelineResult<GeoapifyClient> {
    GeoapifyClient::new(
        &config.geoapify_base_url,
        config.require_geoapify_key()?,
        config.request_timeout_secs,
    )
    .map_err(|e| PipelineError::Setup {
        service: "Geoapify",
        reason: e.to_string(),
    })
}
