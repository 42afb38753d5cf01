//! Failure taxonomy for summary enrichment.

/// Why an enrichment request produced no summary.
///
/// These never escape the coordinator as errors; they end the request in
/// the `Failed` state and are shown to the user via [`user_message`].
///
/// [`user_message`]: EnrichmentError::user_message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrichmentError {
    /// No API key is stored. No request was sent.
    #[error("no Gemini API key configured")]
    MissingCredential,

    /// The service reported quota exhaustion (error code 429).
    #[error("rate limited by the Gemini API")]
    RateLimited,

    /// Any other error object returned by the service.
    #[error("Gemini API error: {0}")]
    Remote(String),

    /// Well-formed response without candidate text.
    #[error("Gemini API returned no summary text")]
    EmptyResult,

    /// The request never completed (DNS, connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),
}

impl EnrichmentError {
    /// Text shown to the user in place of a summary.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingCredential => {
                "Please set a Google Gemini API key first (glean key set <KEY>).".into()
            }
            Self::RateLimited => "Error: Too many requests. Please wait a moment.".into(),
            Self::Remote(message) => format!("Error: {message}"),
            Self::EmptyResult => "Error: No summary generated.".into(),
            Self::Network(_) => "Network Error: Could not reach Google API.".into(),
        }
    }
}
