//! Generative-text service clients.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::chat::{ChatRole, ChatTurn};

/// Generation errors.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Failed to parse service response: {0}")]
    ResponseParsing(String),

    #[error("Service returned no text")]
    Empty,
}

pub type GenerationResult<T> = Result<T, GenerationError>;

/// A text-generation capability: prompt in, reply text out.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> GenerationResult<String>;

    /// Reply to a conversation ending in a user turn. By default only the
    /// last turn is sent.
    fn generate_chat(&self, turns: &[ChatTurn]) -> GenerationResult<String> {
        let prompt = turns.last().map(ChatTurn::text).unwrap_or_default();
        self.generate(&prompt)
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for std::sync::Arc<T> {
    fn generate(&self, prompt: &str) -> GenerationResult<String> {
        (**self).generate(prompt)
    }

    fn generate_chat(&self, turns: &[ChatTurn]) -> GenerationResult<String> {
        (**self).generate_chat(turns)
    }
}

/// Default Gemini REST endpoint.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default Gemini model for prescription structuring.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro";

/// Google Gemini `generateContent` client.
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl GeminiClient {
    /// Create a client for `model` at `base_url` with a per-request timeout.
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout_secs: u64,
    ) -> GenerationResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GenerationError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            client,
            timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn post(&self, body: &GenerateContentRequest<'_>) -> GenerationResult<String> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.timeout_secs)
                } else {
                    GenerationError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .map_err(|e| GenerationError::ResponseParsing(e.to_string()))?;

        let text = parsed.into_text();
        if text.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text)
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default()
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, prompt: &str) -> GenerationResult<String> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: ChatRole::User.as_str(),
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "Requesting structured text");
        self.post(&body)
    }

    fn generate_chat(&self, turns: &[ChatTurn]) -> GenerationResult<String> {
        debug!(model = %self.model, turns = turns.len(), "Requesting chat reply");
        self.post(&chat_request(turns))
    }
}

fn chat_request(turns: &[ChatTurn]) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        contents: turns
            .iter()
            .map(|turn| Content {
                role: turn.role.as_str(),
                parts: turn
                    .parts
                    .iter()
                    .map(|p| RequestPart { text: &p.text })
                    .collect(),
            })
            .collect(),
    }
}

/// Scripted generator for testing without a network service.
///
/// Replies are returned in order; once the script runs out the last reply
/// repeats. Every prompt received is recorded.
pub struct MockGenerator {
    replies: Vec<MockReply>,
    prompts: Mutex<Vec<String>>,
}

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail,
}

impl MockGenerator {
    /// Always reply with `text`.
    pub fn replying(text: &str) -> Self {
        Self::scripted(vec![MockReply::Text(text.to_string())])
    }

    /// Always fail as if the service were unreachable.
    pub fn failing() -> Self {
        Self::scripted(vec![MockReply::Fail])
    }

    pub fn scripted(replies: Vec<MockReply>) -> Self {
        Self {
            replies,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl TextGenerator for MockGenerator {
    fn generate(&self, prompt: &str) -> GenerationResult<String> {
        let call = match self.prompts.lock() {
            Ok(mut prompts) => {
                prompts.push(prompt.to_string());
                prompts.len() - 1
            }
            Err(_) => 0,
        };

        let reply = self
            .replies
            .get(call)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or(MockReply::Fail);

        match reply {
            MockReply::Text(text) if text.trim().is_empty() => Err(GenerationError::Empty),
            MockReply::Text(text) => Ok(text),
            MockReply::Fail => Err(GenerationError::HttpClient("connection refused".into())),
        }
    }
}
