//! Error types for editor session management

use std::path::PathBuf;
use std::time::Duration;

use crate::filters::CodecError;
use crate::io::ProcessError;

// ============================================================================
// Session Errors
// ============================================================================

/// Error types for editor session lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Temp file and stat errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Editor process errors (spawn, state misuse)
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Codec failure during round-trip verification
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Configuration validation errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Round-trip verification failed: the codec would corrupt content
    #[error("filter is lossy. decoded:\n{decoded}\n\nre-decoded:\n{redecoded}")]
    LossyCodec { decoded: String, redecoded: String },
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration validation and building errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Missing required configuration field
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Editor command present but empty
    #[error("Editor command must not be empty")]
    EmptyEditorCommand,

    /// Invalid interval value
    #[error("Invalid interval: {interval:?} - {reason}")]
    InvalidInterval { interval: Duration, reason: String },

    /// Temp directory does not exist or is not a directory
    #[error("Invalid temp directory: {path}")]
    InvalidTempDir { path: PathBuf },
}

impl ConfigError {
    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create an invalid interval error
    pub fn invalid_interval(interval: Duration, reason: impl Into<String>) -> Self {
        Self::InvalidInterval {
            interval,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
