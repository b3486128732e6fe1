//! Error types for the Clio client.

use clio_core::{CredentialError, TransportError};

use crate::write::WriteReport;

/// Errors that can occur when using the Clio client.
#[derive(Debug, thiserror::Error)]
pub enum ClioError {
    /// No dataset, or one the server does not list.
    #[error("{}", dataset_required_message(.requested, .available))]
    DatasetRequired {
        /// Name the caller asked for, if any.
        requested: Option<String>,
        /// Names the server listed while resolving.
        available: Vec<String>,
    },

    /// The credential strategy could not supply an accepted token.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Network, server or response-shape failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Some records of a multi-record write failed.
    #[error("{0}")]
    PartialWrite(WriteReport),

    /// Query combines modes that cannot be combined.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Annotations handed to a write are malformed.
    #[error("invalid annotations: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

fn dataset_required_message(requested: &Option<String>, available: &[String]) -> String {
    let listing = if available.is_empty() {
        "the server lists no datasets".to_string()
    } else {
        format!("available datasets: {}", available.join(", "))
    };

    match requested {
        Some(name) => format!("dataset '{}' does not exist on the Clio server; {}", name, listing),
        None => format!("a dataset is required; {}", listing),
    }
}

impl ClioError {
    /// Returns the write report for partial failures.
    pub fn write_report(&self) -> Option<&WriteReport> {
        match self {
            ClioError::PartialWrite(report) => Some(report),
            _ => None,
        }
    }

    /// HTTP status behind the error, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClioError::Transport(e) => e.status(),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClioError>;
