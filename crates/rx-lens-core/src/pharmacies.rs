//! Nearby pharmacy search (Geoapify Places).

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Public Geoapify API endpoint.
pub const DEFAULT_GEOAPIFY_BASE_URL: &str = "https://api.geoapify.com/v2";

/// Search radius around the caller.
pub const SEARCH_RADIUS_METERS: u32 = 50_000;

/// Most pharmacies returned per search.
pub const RESULT_LIMIT: u32 = 10;

pub const UNNAMED_PHARMACY: &str = "Unnamed Pharmacy";
pub const ADDRESS_NOT_AVAILABLE: &str = "Address not available";

/// Pharmacy search errors.
#[derive(Error, Debug)]
pub enum PharmacyError {
    #[error("Invalid coordinates: lat {lat}, lon {lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Failed to parse service response: {0}")]
    ResponseParsing(String),
}

pub type PharmacyResult<T> = Result<T, PharmacyError>;

/// A validated WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    lat: f64,
    lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> PharmacyResult<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        if !valid {
            return Err(PharmacyError::InvalidCoordinates { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pharmacy {
    pub id: String,
    pub name: String,
    pub address: String,
}

/// Finds pharmacies near a position, nearest first.
pub trait PharmacyFinder: Send + Sync {
    fn nearby(&self, at: Coordinates) -> PharmacyResult<Vec<Pharmacy>>;
}

/// Blocking Geoapify Places client.
pub struct GeoapifyClient {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl GeoapifyClient {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> PharmacyResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PharmacyError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            timeout_secs,
        })
    }
}

/// Query parameters for a pharmacy search around `at`.
fn search_query(at: Coordinates) -> Vec<(&'static str, String)> {
    vec![
        ("categories", "healthcare.pharmacy".to_string()),
        (
            "filter",
            format!("circle:{},{},{}", at.lon, at.lat, SEARCH_RADIUS_METERS),
        ),
        ("bias", format!("proximity:{},{}", at.lon, at.lat)),
        ("limit", RESULT_LIMIT.to_string()),
    ]
}

impl PharmacyFinder for GeoapifyClient {
    fn nearby(&self, at: Coordinates) -> PharmacyResult<Vec<Pharmacy>> {
        let url = format!("{}/places", self.base_url);
        let mut query = search_query(at);
        query.push(("apiKey", self.api_key.clone()));

        debug!(lat = at.lat, lon = at.lon, "Searching pharmacies");
        let response = self.client.get(&url).query(&query).send().map_err(|e| {
            if e.is_timeout() {
                PharmacyError::Timeout(self.timeout_secs)
            } else {
                PharmacyError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PharmacyError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .map_err(|e| PharmacyError::Network(e.to_string()))?;
        let places: PlacesResponse = serde_json::from_str(&body)
            .map_err(|e| PharmacyError::ResponseParsing(e.to_string()))?;

        let pharmacies = places.into_pharmacies();
        info!(count = pharmacies.len(), "Found pharmacies");
        Ok(pharmacies)
    }
}

#[derive(Debug, Default, Deserialize)]
struct PlacesResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Default, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: PlaceProperties,
}

#[derive(Debug, Default, Deserialize)]
struct PlaceProperties {
    place_id: Option<String>,
    name: Option<String>,
    formatted: Option<String>,
}

impl PlacesResponse {
    fn into_pharmacies(self) -> Vec<Pharmacy> {
        self.features
            .into_iter()
            .map(|feature| {
                let p = feature.properties;
                Pharmacy {
                    id: p.place_id.unwrap_or_else(placeholder_id),
                    name: p.name.unwrap_or_else(|| UNNAMED_PHARMACY.to_string()),
                    address: p
                        .formatted
                        .unwrap_or_else(|| ADDRESS_NOT_AVAILABLE.to_string()),
                }
            })
            .collect()
    }
}

/// Random id for a place the service returned without one.
fn placeholder_id() -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("pharm-{}", suffix)
}

/// Scripted pharmacy finder for tests and offline runs.
#[derive(Default)]
pub struct MockPharmacyFinder {
    pharmacies: Vec<Pharmacy>,
    fail: bool,
    searches: Mutex<Vec<Coordinates>>,
}

impl MockPharmacyFinder {
    pub fn returning(pharmacies: Vec<Pharmacy>) -> Self {
        Self {
            pharmacies,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Positions searched so far.
    pub fn searches(&self) -> Vec<Coordinates> {
        self.searches.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl PharmacyFinder for MockPharmacyFinder {
    fn nearby(&self, at: Coordinates) -> PharmacyResult<Vec<Pharmacy>> {
        if let Ok(mut searches) = self.searches.lock() {
            searches.push(at);
        }
        if self.fail {
            return Err(PharmacyError::Network("connection refused".into()));
        }
        Ok(self.pharmacies.clone())
    }
}

impl<T: PharmacyFinder + ?Sized> PharmacyFinder for std::sync::Arc<T> {
    fn nearby(&self, at: Coordinates) -> PharmacyResult<Vec<Pharmacy>> {
        (**self).nearby(at)
    }
}
