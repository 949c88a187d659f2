//! Runtime configuration from environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::alternatives::DEFAULT_RXNAV_BASE_URL;
use crate::db::{DbResult, Records};
use crate::pharmacies::DEFAULT_GEOAPIFY_BASE_URL;
use rx_lens_llm::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_CHAT_MODEL, DEFAULT_GEMINI_MODEL};

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_MODEL_PATH: &str = "ml_model/medicine_model.json";
pub const DEFAULT_TESSERACT_PATH: &str = "tesseract";
pub const DEFAULT_OCR_LANGUAGE: &str = "eng";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_OCR_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_LOOKUP_RETRIES: u32 = 2;
pub const DEFAULT_LOOKUP_WORKERS: usize = 4;

/// SQLite file name inside the data directory.
pub const SQLITE_FILE_NAME: &str = "rx-lens.db";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Record store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// One JSON file per collection
    Json,
    /// Single SQLite database file
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(StoreBackend::Json),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(format!("expected json or sqlite, got {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub store: StoreBackend,
    pub model_path: PathBuf,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_chat_model: String,
    pub gemini_base_url: String,
    pub rxnav_base_url: String,
    pub geoapify_api_key: Option<String>,
    pub geoapify_base_url: String,
    pub tesseract_path: PathBuf,
    pub ocr_language: String,
    pub request_timeout_secs: u64,
    pub ocr_timeout_secs: u64,
    pub lookup_retries: u32,
    pub lookup_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            store: StoreBackend::Json,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_chat_model: DEFAULT_GEMINI_CHAT_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            rxnav_base_url: DEFAULT_RXNAV_BASE_URL.to_string(),
            geoapify_api_key: None,
            geoapify_base_url: DEFAULT_GEOAPIFY_BASE_URL.to_string(),
            tesseract_path: PathBuf::from(DEFAULT_TESSERACT_PATH),
            ocr_language: DEFAULT_OCR_LANGUAGE.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            ocr_timeout_secs: DEFAULT_OCR_TIMEOUT_SECS,
            lookup_retries: DEFAULT_LOOKUP_RETRIES,
            lookup_workers: DEFAULT_LOOKUP_WORKERS,
        }
    }
}

impl Config {
    /// Read settings from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup` (useful for testing). Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        Ok(Config {
            data_dir: get("RX_LENS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            store: parse(&get, "RX_LENS_STORE")?.unwrap_or(defaults.store),
            model_path: get("RX_LENS_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_chat_model: get("GEMINI_CHAT_MODEL").unwrap_or(defaults.gemini_chat_model),
            gemini_base_url: get("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            rxnav_base_url: get("RXNAV_BASE_URL").unwrap_or(defaults.rxnav_base_url),
            geoapify_api_key: get("GEOAPIFY_API_KEY"),
            geoapify_base_url: get("GEOAPIFY_BASE_URL").unwrap_or(defaults.geoapify_base_url),
            tesseract_path: get("TESSERACT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.tesseract_path),
            ocr_language: get("OCR_LANGUAGE").unwrap_or(defaults.ocr_language),
            request_timeout_secs: parse(&get, "RX_LENS_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(defaults.request_timeout_secs),
            ocr_timeout_secs: parse(&get, "RX_LENS_OCR_TIMEOUT_SECS")?
                .unwrap_or(defaults.ocr_timeout_secs),
            lookup_retries: parse(&get, "RX_LENS_LOOKUP_RETRIES")?
                .unwrap_or(defaults.lookup_retries),
            lookup_workers: parse(&get, "RX_LENS_LOOKUP_WORKERS")?
                .unwrap_or(defaults.lookup_workers),
        })
    }

    /// The Gemini API key, required to build a pipeline.
    pub fn require_api_key(&self) -> ConfigResult<&str> {
        self.gemini_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("GEMINI_API_KEY"))
    }

    /// The Geoapify API key, required for pharmacy search.
    pub fn require_geoapify_key(&self) -> ConfigResult<&str> {
        self.geoapify_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("GEOAPIFY_API_KEY"))
    }

    /// Open the configured record store.
    pub fn open_records(&self) -> DbResult<Records> {
        match self.store {
            StoreBackend::Json => Records::open_json_dir(&self.data_dir),
            StoreBackend::Sqlite => {
                std::fs::create_dir_all(&self.data_dir)?;
                Records::open_sqlite(self.data_dir.join(SQLITE_FILE_NAME))
            }
        }
    }
}

fn parse<T, G>(get: &G, var: &'static str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                var,
                value,
                reason: e.to_string(),
            }),
    }
}
