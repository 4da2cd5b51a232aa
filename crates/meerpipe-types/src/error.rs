//! Error types for parsing shared values.

use thiserror::Error;

/// Result type alias using the shared error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing timestamps, bands and stage names.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid UTC timestamp '{value}': expected YYYY-MM-DD-HH:MM:SS or ISO-8601")]
    InvalidUtc { value: String },

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
