//! # Market Error Types
//!
//! Errors raised at the load/save seams of the market: catalog parsing,
//! recipe registration and ledger storage. Price queries never return these;
//! they price at zero and log instead.

use thiserror::Error;

/// Errors that can occur while loading or persisting market data.
#[derive(Error, Debug)]
pub enum MarketError {
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A catalog entry failed validation.
    #[error("invalid catalog entry {key}: {reason}")]
    InvalidEntry {
        /// The offending item key.
        key: String,
        /// Why the entry was rejected.
        reason: String,
    },

    /// Recipe ID registered twice.
    #[error("recipe {0} already exists")]
    DuplicateRecipe(u32),

    /// Recipe with no ingredients or a zero output quantity.
    #[error("recipe {0} must have at least one ingredient and a positive output")]
    EmptyRecipe(String),

    /// The recipe graph contains a cycle (listed as item keys).
    #[error("cycle detected in recipe graph: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    /// Filesystem failure while reading or writing market files.
    #[error("market file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// TOML document could not be parsed.
    #[error("malformed TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Ledger state could not be serialized.
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result type for market load/save operations.
pub type MarketResult<T> = Result<T, MarketError>;
