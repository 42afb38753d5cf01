//! Core domain types for captured highlights.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{GleanError, Result};

/// Store key holding the whole highlight collection.
pub const HIGHLIGHTS_KEY: &str = "highlights";

/// Store key holding the Gemini API key.
pub const CREDENTIAL_KEY: &str = "gemini_key";

// ---------------------------------------------------------------------------
// HighlightId
// ---------------------------------------------------------------------------

/// Primary key of a highlight: the epoch-millisecond timestamp it was
/// allocated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HighlightId(pub i64);

impl HighlightId {
    pub fn as_millis(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for HighlightId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for HighlightId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

// ---------------------------------------------------------------------------
// Highlight
// ---------------------------------------------------------------------------

/// A persisted snippet of captured text plus its provenance.
///
/// `text` is stored verbatim; escaping for markup is the renderer's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: HighlightId,
    pub text: String,
    /// Absolute source URL at capture time.
    pub url: String,
    /// Source document title at capture time.
    pub title: String,
    /// Human-readable capture date. Informational only.
    pub date: String,
    /// One-sentence summary, present only after a successful enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Highlight {
    /// Host part of the source URL, for display.
    pub fn hostname(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
    }
}

// ---------------------------------------------------------------------------
// NewHighlight
// ---------------------------------------------------------------------------

/// Fields supplied by the capture side when saving a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHighlight {
    pub text: String,
    pub url: String,
    pub title: String,
    pub date: String,
}

impl NewHighlight {
    /// Build a capture from raw input, trimming the selection and checking
    /// that it is non-empty and that the URL is absolute.
    pub fn from_capture(
        text: &str,
        url: &str,
        title: impl Into<String>,
        date: impl Into<String>,
    ) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GleanError::validation("highlight text is empty"));
        }

        Url::parse(url)
            .map_err(|e| GleanError::validation(format!("invalid source URL '{url}': {e}")))?;

        Ok(Self {
            text: text.to_owned(),
            url: url.to_owned(),
            title: title.into(),
            date: date.into(),
        })
    }
}
