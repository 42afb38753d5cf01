//! Shared types, error model, and configuration for Glean.
//!
//! This crate is the foundation depended on by all other Glean crates.
//! It provides:
//! - [`GleanError`]: the unified error type
//! - Domain types ([`Highlight`], [`HighlightId`], [`NewHighlight`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_GEMINI_BASE_URL, GeminiConfig, StorageConfig, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from,
};
pub use error::{GleanError, Result};
pub use types::{CREDENTIAL_KEY, HIGHLIGHTS_KEY, Highlight, HighlightId, NewHighlight};
