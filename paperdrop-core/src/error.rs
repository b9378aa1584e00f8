//! Error types for paperdrop-core.

use thiserror::Error;

/// All errors that can arise while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// An allow-list entry is not a valid glob.
    #[error("invalid allow-list pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// `METRICS_ADDR` could not be parsed as a socket address.
    #[error("invalid listen address '{value}' in {key}")]
    ListenAddr { key: &'static str, value: String },
}
