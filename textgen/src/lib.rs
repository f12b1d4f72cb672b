//! Minimal client for OpenAI-compatible text completion APIs.
//!
//! This crate provides a focused client for the legacy completions
//! endpoint exposed by local inference servers:
//! - `POST {base}/v1/completions` for text completion
//! - `GET {base}/v1/models` for model discovery
//!
//! Responses are expected to be a short quoted value; [`extract_value`]
//! cuts the raw completion at the first unescaped double quote.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur when using the completion client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("No base URL configured")]
    MissingBaseUrl,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Failed to parse response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Whether this error means the endpoint is unreachable.
    ///
    /// Connection-class failures abort a multi-stat generation run;
    /// everything else is handled per stat.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Api { status: 0, .. } => true,
            _ => false,
        }
    }
}

/// Text completion API client.
#[derive(Clone)]
pub struct TextGen {
    client: reqwest::Client,
    base_url: String,
    model: Option<String>,
}

impl TextGen {
    /// Create a new client for the given base URL (e.g. `http://127.0.0.1:5000`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: trim_base_url(base_url.into()),
            model: None,
        }
    }

    /// Create a client from the `TEXTGEN_BASE_URL` environment variable.
    ///
    /// `TEXTGEN_MODEL` is picked up as the default model when set.
    pub fn from_env() -> Result<Self, Error> {
        let base_url = std::env::var("TEXTGEN_BASE_URL").map_err(|_| Error::MissingBaseUrl)?;
        let mut client = Self::new(base_url);
        if let Ok(model) = std::env::var("TEXTGEN_MODEL") {
            client.model = Some(model);
        }
        Ok(client)
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        self
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The configured default model, if any.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Send a completion request and return the raw completion.
    pub async fn complete(&self, request: CompletionRequest) -> Result<Completion, Error> {
        if self.base_url.is_empty() {
            return Err(Error::MissingBaseUrl);
        }

        let model = request
            .model
            .clone()
            .or_else(|| self.model.clone())
            .ok_or_else(|| Error::Config("no model configured".to_string()))?;

        let api_request = ApiRequest {
            model: model.clone(),
            prompt: request.prompt,
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/v1/completions", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 404 {
                return Err(Error::ModelNotFound(model));
            }
            return Err(Error::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("no choices in response".to_string()))?;

        Ok(Completion { text: choice.text })
    }

    /// List the models the server has loaded.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, Error> {
        if self.base_url.is_empty() {
            return Err(Error::MissingBaseUrl);
        }

        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let listing: ApiModelList = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        Ok(listing.data)
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    Error::Network(e.to_string())
}

/// Pull the human-readable message out of an error body, falling back
/// to the raw body for servers that do not wrap their errors.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| body.to_string())
}

fn trim_base_url(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

/// A completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: usize,
}

impl CompletionRequest {
    /// Create a request with exploratory sampling defaults.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            model: None,
            prompt: prompt.into(),
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 64,
        }
    }

    /// Sample greedily (temperature 0): same prompt, same value.
    pub fn greedy(prompt: impl Into<String>) -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
            ..Self::new(prompt)
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A raw completion from the server.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The untrimmed completion text of the first choice.
    pub text: String,
}

impl Completion {
    /// The completion cut at the first unescaped quote, trimmed and unescaped.
    pub fn value(&self) -> String {
        extract_value(&self.text)
    }
}

/// A model known to the server.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
}

/// Extract a quoted value from a raw completion.
///
/// The prompt ends mid-attribute (`key="`), so the completion is the bare
/// value followed by a closing quote and whatever the model rambles on
/// with. Takes the substring up to the first unescaped `"`, trims it, and
/// resolves `\"` and `\\` escapes.
pub fn extract_value(text: &str) -> String {
    let mut out = String::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                } else {
                    out.push('\\');
                }
            }
            _ => out.push(c),
        }
    }
    out.trim().to_string()
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    prompt: String,
    temperature: f32,
    top_p: f32,
    max_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiModelList {
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = TextGen::new("http://localhost:5000");
        assert_eq!(client.base_url(), "http://localhost:5000");
        assert!(client.model().is_none());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = TextGen::new("http://localhost:5000///");
        assert_eq!(client.base_url(), "http://localhost:5000");
    }

    #[test]
    fn test_client_with_model() {
        let client = TextGen::new("http://localhost:5000").with_model("mistral-7b");
        assert_eq!(client.model(), Some("mistral-7b"));
    }

    #[test]
    fn test_request_defaults() {
        let request = CompletionRequest::new("prompt");
        assert_eq!(request.temperature, 0.7);
        assert_eq!(request.max_tokens, 64);

        let greedy = CompletionRequest::greedy("prompt");
        assert_eq!(greedy.temperature, 0.0);
        assert_eq!(greedy.top_p, 1.0);
    }

    #[test]
    fn test_extract_value_plain() {
        assert_eq!(extract_value("standing\" />"), "standing");
    }

    #[test]
    fn test_extract_value_trims() {
        assert_eq!(extract_value("  a dark room \"..."), "a dark room");
    }

    #[test]
    fn test_extract_value_no_quote() {
        assert_eq!(extract_value("unterminated value"), "unterminated value");
    }

    #[test]
    fn test_extract_value_escapes() {
        assert_eq!(
            extract_value(r#"says \"hello\" softly" trailing"#),
            r#"says "hello" softly"#
        );
        assert_eq!(extract_value(r#"C:\\temp" rest"#), r"C:\temp");
    }

    #[test]
    fn test_extract_value_trailing_backslash() {
        assert_eq!(extract_value("oops\\"), "oops\\");
    }

    #[test]
    fn test_error_message_unwraps_api_shape() {
        assert_eq!(
            error_message(r#"{"error":{"message":"model is not loaded"}}"#),
            "model is not loaded"
        );
        assert_eq!(error_message("plain 502 page"), "plain 502 page");
    }

    #[test]
    fn test_connection_failure_classification() {
        assert!(Error::Network("timed out".to_string()).is_connection_failure());
        assert!(Error::Api {
            status: 0,
            message: String::new()
        }
        .is_connection_failure());
        assert!(!Error::ModelNotFound("m".to_string()).is_connection_failure());
        assert!(!Error::InvalidResponse("bad json".to_string()).is_connection_failure());
        assert!(!Error::Api {
            status: 500,
            message: String::new()
        }
        .is_connection_failure());
    }
}
