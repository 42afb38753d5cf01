//! Gemini summarization client.
//!
//! Sends one `generateContent` request per summary. The primary model is
//! tried first; a 404 or 400 (model unknown or unsupported for this key)
//! triggers exactly one retry against the fallback model. Nothing else is
//! retried.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};

use glean_shared::{GeminiConfig, GleanError, Result};

use crate::error::EnrichmentError;

/// Model tried first.
pub const PRIMARY_MODEL: &str = "gemini-2.5-flash";

/// Model tried once when the primary is rejected.
pub const FALLBACK_MODEL: &str = "gemini-1.5-flash";

/// Instruction prepended to the captured text.
pub const SUMMARY_DIRECTIVE: &str = "Summarize the following text in one concise sentence: ";

/// Remote error code for quota exhaustion.
const RATE_LIMITED_CODE: i64 = 429;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("Glean/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// `generateContent` request body.
#[derive(Debug, serde::Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, serde::Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, serde::Serialize)]
struct RequestPart {
    text: String,
}

impl GenerateRequest {
    /// Single-part summarization prompt. The text is sent raw.
    fn summarize(text: &str) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: format!("{SUMMARY_DIRECTIVE}{text}"),
                }],
            }],
        }
    }
}

/// `generateContent` response body: either an error object or candidates.
#[derive(Debug, serde::Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, serde::Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, serde::Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, serde::Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate.
    fn first_text(self) -> Option<String> {
        self.candidates?
            .into_iter()
            .next()?
            .content?
            .parts?
            .into_iter()
            .next()?
            .text
    }
}

// ---------------------------------------------------------------------------
// EnrichmentClient
// ---------------------------------------------------------------------------

/// Stateless Gemini client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EnrichmentClient {
    client: Client,
    base_url: String,
}

impl EnrichmentClient {
    /// Build a client for the configured endpoint.
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| GleanError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Summarize `text` in one sentence.
    ///
    /// `api_key` must be non-empty; the coordinator checks this before
    /// calling.
    #[instrument(skip_all, fields(chars = text.chars().count()))]
    pub async fn summarize(
        &self,
        text: &str,
        api_key: &str,
    ) -> std::result::Result<String, EnrichmentError> {
        debug_assert!(!api_key.is_empty(), "api key must be checked by the caller");
        let request = GenerateRequest::summarize(text);

        let mut model = PRIMARY_MODEL;
        let mut response = self.send(model, api_key, &request).await?;

        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST
        ) {
            warn!(
                status = response.status().as_u16(),
                fallback = FALLBACK_MODEL,
                "primary model rejected, switching to fallback"
            );
            model = FALLBACK_MODEL;
            response = self.send(model, api_key, &request).await?;
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EnrichmentError::Network(e.without_url().to_string()))?;

        let summary = classify_response(status, &body)?;
        info!(model, "summary generated");
        Ok(summary)
    }

    /// POST one request. The key travels as a query parameter, so transport
    /// errors are stripped of their URL before they are reported.
    async fn send(
        &self,
        model: &str,
        api_key: &str,
        request: &GenerateRequest,
    ) -> std::result::Result<reqwest::Response, EnrichmentError> {
        let url = format!("{}/v1beta/models/{model}:generateContent", self.base_url);
        debug!(model, "sending generateContent request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(request)
            .send()
            .await
            .map_err(|e| EnrichmentError::Network(e.without_url().to_string()))?;

        debug!(model, status = response.status().as_u16(), "response received");
        Ok(response)
    }
}

/// Classify the final response body. The body's own `error` field decides;
/// the HTTP status is only kept for the detail of an unreadable body, which
/// means something other than the API answered (proxy, captive portal).
fn classify_response(
    status: StatusCode,
    body: &str,
) -> std::result::Result<String, EnrichmentError> {
    let parsed: GenerateResponse = serde_json::from_str(body).map_err(|e| {
        debug!(error = %e, "response body is not a generateContent object");
        EnrichmentError::Network(format!("unreadable response body (HTTP {})", status.as_u16()))
    })?;

    if let Some(error) = parsed.error {
        if error.code == Some(RATE_LIMITED_CODE) {
            return Err(EnrichmentError::RateLimited);
        }
        let message = error
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Unknown error".into());
        return Err(EnrichmentError::Remote(message));
    }

    match parsed.first_text() {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(EnrichmentError::EmptyResult),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
