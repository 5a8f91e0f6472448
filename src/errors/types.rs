//! Error type definitions for the harvesting pipeline
//!
//! Almost nothing here reaches the top level: a fault on one stream or one
//! playlist is absorbed where it happens and recorded as data, not raised.
//! What remains typed is the persistence layer, whose failures the
//! checkpointer logs and retries, and the probe backend, whose absence is a
//! startup precondition.

use std::path::PathBuf;
use thiserror::Error;

/// Application-level errors surfaced by persistence and loading paths.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Atomic-write protocol failures (progress files, output playlist)
    #[error("Persistence error for {}: {}", .path.display(), .source)]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Data serialization/deserialization failures
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Probe backend specific errors
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The backend binary is not installed or not on PATH
    #[error("Probe backend unavailable: {message}")]
    Unavailable { message: String },

    /// The backend did not answer within its deadline
    #[error("Probe timed out after {seconds}s: {url}")]
    Timeout { seconds: u64, url: String },

    /// The backend answered with something unusable
    #[error("Probe output unreadable: {message}")]
    Output { message: String },
}

impl HarvestError {
    /// Create a persistence error for a specific path
    pub fn persistence<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}

impl ProbeError {
    /// Create an unavailable-backend error
    pub fn unavailable<M: Into<String>>(message: M) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create an unreadable-output error
    pub fn output<M: Into<String>>(message: M) -> Self {
        Self::Output {
            message: message.into(),
        }
    }
}
