//! RxNav REST client for RxCUI and brand-name lookups.

use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{DrugLookup, LookupError, LookupResult};

/// Public NLM RxNav endpoint.
pub const DEFAULT_RXNAV_BASE_URL: &str = "https://rxnav.nlm.nih.gov/REST";

/// Exponential backoff for transient lookup failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }

    pub fn should_retry(&self, retry: u32) -> bool {
        retry < self.max_retries
    }
}

/// Blocking RxNav client.
pub struct RxNavClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
    retry: RetryPolicy,
}

impl RxNavClient {
    pub fn new(base_url: &str, timeout_secs: u64, retry: RetryPolicy) -> LookupResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LookupError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
            retry,
        })
    }

    /// GET with retries on transient failures.
    fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> LookupResult<T> {
        let mut retry = 0;
        loop {
            match self.get_once(url, query) {
                Ok(body) => return parse_json(&body),
                Err(e) if e.is_transient() && self.retry.should_retry(retry) => {
                    let delay = self.retry.delay_for(retry);
                    warn!(url, error = %e, retry = retry + 1, delay_ms = delay.as_millis() as u64, "Retrying lookup");
                    thread::sleep(delay);
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn get_once(&self, url: &str, query: &[(&str, &str)]) -> LookupResult<String> {
        let response = self.client.get(url).query(query).send().map_err(|e| {
            if e.is_timeout() {
                LookupError::Timeout(self.timeout_secs)
            } else {
                LookupError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LookupError::Service {
                status: status.as_u16(),
                body,
            });
        }

        response
            .text()
            .map_err(|e| LookupError::Network(e.to_string()))
    }
}

impl DrugLookup for RxNavClient {
    fn find_identifier(&self, name: &str) -> LookupResult<Option<String>> {
        let url = format!("{}/rxcui.json", self.base_url);
        let response: RxcuiResponse = self.get_json(&url, &[("name", name)])?;
        let id = response.into_identifier();
        debug!(drug = %name, rxcui = ?id, "Identifier lookup");
        Ok(id)
    }

    fn brand_names(&self, identifier: &str) -> LookupResult<Vec<String>> {
        let url = format!("{}/rxcui/{}/related.json", self.base_url, identifier);
        let response: RelatedResponse = self.get_json(&url, &[("tty", "BN")])?;
        Ok(response.into_brand_names())
    }
}

fn parse_json<T: DeserializeOwned>(body: &str) -> LookupResult<T> {
    serde_json::from_str(body).map_err(|e| LookupError::ResponseParsing(e.to_string()))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RxcuiResponse {
    #[serde(rename = "idGroup", default)]
    id_group: IdGroup,
}

#[derive(Debug, Default, Deserialize)]
struct IdGroup {
    #[serde(rename = "rxnormId", default)]
    rxnorm_id: Vec<String>,
}

impl RxcuiResponse {
    pub(crate) fn into_identifier(self) -> Option<String> {
        self.id_group.rxnorm_id.into_iter().next()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RelatedResponse {
    #[serde(rename = "relatedGroup", default)]
    related_group: RelatedGroup,
}

#[derive(Debug, Default, Deserialize)]
struct RelatedGroup {
    #[serde(rename = "conceptGroup", default)]
    concept_group: Vec<ConceptGroup>,
}

#[derive(Debug, Default, Deserialize)]
struct ConceptGroup {
    #[serde(rename = "conceptProperties", default)]
    concept_properties: Vec<ConceptProperty>,
}

#[derive(Debug, Deserialize)]
struct ConceptProperty {
    name: String,
}

impl RelatedResponse {
    /// Brand names across every concept group, in response order.
    pub(crate) fn into_brand_names(self) -> Vec<String> {
        self.related_group
            .concept_group
            .into_iter()
            .flat_map(|group| group.concept_properties)
            .map(|concept| concept.name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_from_response() {
        let body = r#"{"idGroup":{"name":"ibuprofen","rxnormId":["5640"]}}"#;
        let response: RxcuiResponse = parse_json(body).unwrap();
        assert_eq!(response.into_identifier(), Some("5640".into()));
    }

    #[test]
    fn test_identifier_absent() {
        let body = r#"{"idGroup":{"name":"xyzmedazole"}}"#;
        let response: RxcuiResponse = parse_json(body).unwrap();
        assert_eq!(response.into_identifier(), None);

        let response: RxcuiResponse = parse_json("{}").unwrap();
        assert_eq!(response.into_identifier(), None);
    }

    #[test]
    fn test_brand_names_across_groups() {
        let body = r#"{
            "relatedGroup": {
                "rxcui": "5640",
                "termType": ["BN"],
                "conceptGroup": [
                    {"tty": "BN", "conceptProperties": [
                        {"rxcui": "153008", "name": "Advil", "tty": "BN"},
                        {"rxcui": "202488", "name": "Motrin", "tty": "BN"}
                    ]},
                    {"tty": "BN"},
                    {"tty": "BN", "conceptProperties": [
                        {"rxcui": "1310503", "name": "Advil", "tty": "BN"}
                    ]}
                ]
            }
        }"#;
        let response: RelatedResponse = parse_json(body).unwrap();
        assert_eq!(response.into_brand_names(), vec!["Advil", "Motrin", "Advil"]);
    }

    #[test]
    fn test_no_brand_groups() {
        let body = r#"{"relatedGroup":{"rxcui":"1","termType":["BN"]}}"#;
        let response: RelatedResponse = parse_json(body).unwrap();
        assert!(response.into_brand_names().is_empty());
    }

    #[test]
    fn test_malformed_body() {
        let err = parse_json::<RxcuiResponse>("<html>").unwrap_err();
        assert!(matches!(err, LookupError::ResponseParsing(_)));
    }

    #[test]
    fn test_retry_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!RetryPolicy::none().should_retry(0));
    }

    #[test]
    fn test_trims_base_url() {
        let client = RxNavClient::new("https://rxnav.example/REST/", 5, RetryPolicy::none()).unwrap();
        assert_eq!(client.base_url, "https://rxnav.example/REST");
    }

    #[test]
    fn test_unreachable_host_fails() {
        let client = RxNavClient::new("http://127.0.0.1:9", 2, RetryPolicy::none()).unwrap();
        assert!(client.find_identifier("ibuprofen").is_err());
    }
}
