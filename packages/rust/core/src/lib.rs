//! Highlight store and enrichment pipeline for Glean.
//!
//! This crate layers the highlight collection on top of the key-value store
//! and wires the Gemini summarizer into per-highlight enrichment requests.

pub mod coordinator;
pub mod credentials;
pub mod enrichment;
pub mod error;
pub mod repository;

pub use coordinator::{
    EnrichOutcome, EnrichmentCoordinator, EnrichmentObserver, EnrichmentState, SilentObserver,
};
pub use credentials::CredentialStore;
pub use enrichment::{EnrichmentClient, FALLBACK_MODEL, PRIMARY_MODEL};
pub use error::EnrichmentError;
pub use repository::{Clock, HighlightRepository, SystemClock};
