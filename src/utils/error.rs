//! Error Handling Module
//!
//! Defines the error type shared by the augmenter, trainer and live runner.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for ASL pipeline operations
#[derive(Error, Debug)]
pub enum AslError {
    /// A required file or directory does not exist
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// An image could not be decoded
    #[error("Failed to decode image at '{path}': {reason}")]
    Decode { path: PathBuf, reason: String },

    /// An image could not be encoded or written
    #[error("Failed to write image at '{path}': {reason}")]
    Encode { path: PathBuf, reason: String },

    /// Tensor, image or class-count dimensions disagree
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// Kelvin value missing from the temperature table
    #[error("Unsupported colour temperature: {0}K (only table entries 1000K..10000K in 500K steps)")]
    UnsupportedTemperature(u32),

    /// Label not known to the label encoder
    #[error("Unknown label: '{0}'")]
    UnknownLabel(String),

    /// A dataset, split or directory turned out empty
    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error with model construction, saving or loading
    #[error("Model error: {0}")]
    Model(String),

    /// Camera capture error
    #[error("Camera error: {0}")]
    Camera(String),

    /// Preview window error
    #[error("Display error: {0}")]
    Display(String),

    /// Chart rendering error
    #[error("Chart error: {0}")]
    Chart(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for AslError {
    fn from(err: serde_json::Error) -> Self {
        AslError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for AslError {
    fn from(err: toml::de::Error) -> Self {
        AslError::Config(err.to_string())
    }
}

impl AslError {
    /// Build a decode error for `path`
    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        AslError::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Build an encode error for `path`
    pub fn encode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        AslError::Encode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a shape mismatch error
    pub fn shape(expected: impl ToString, actual: impl ToString) -> Self {
        AslError::ShapeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Convenience Result type for ASL pipeline operations
pub type Result<T> = std::result::Result<T, AslError>;
