//! Error types for biotag.

use thiserror::Error;

/// Result type for biotag operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for biotag operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Model file could not be read or decoded.
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed input data.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid argument or input combination.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown registry tag for a pluggable provider.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Evaluation setup or scoring error.
    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

impl Error {
    /// Create a model load error.
    pub fn model_load(msg: impl Into<String>) -> Self {
        Error::ModelLoad(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create an unknown provider error.
    pub fn unknown_provider(tag: impl Into<String>) -> Self {
        Error::UnknownProvider(tag.into())
    }

    /// Create an evaluation error.
    pub fn evaluation(msg: impl Into<String>) -> Self {
        Error::Evaluation(msg.into())
    }
}
