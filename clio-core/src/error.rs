//! Error types for credential handling and HTTP transport.

use std::path::PathBuf;

use thiserror::Error;

use crate::provider::StrategyKind;

/// Error type for token file operations.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    /// I/O error reading or writing the token file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Nothing usable was left after normalizing the token.
    #[error("refusing to store an empty token")]
    EmptyToken,
}

/// Failures of a credential strategy.
///
/// Each variant is recoverable only by caller action appropriate to the
/// strategy in use, which is why the messages say what to do next.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No cached token exists for the cached strategy.
    #[error(
        "no cached Clio token at {}; call set_token() or set CLIO_APPLICATION_CREDENTIALS",
        path.display()
    )]
    Missing { path: PathBuf },

    /// The service rejected the token and the strategy cannot recover.
    #[error("Clio rejected the {strategy} token: {hint}")]
    Expired {
        strategy: StrategyKind,
        hint: String,
    },

    /// The identity helper or token exchange failed.
    #[error("token refresh failed: {message}")]
    RefreshFailed { message: String },

    /// The token file could not be read or written.
    #[error("token store error: {0}")]
    Store(#[from] TokenStoreError),
}

/// Failures talking to the Clio service.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, DNS, TLS or timeout error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("{method} {url} failed with status {status}: {message}")]
    Status {
        method: String,
        url: String,
        status: u16,
        message: String,
    },

    /// The response body was not the JSON shape expected.
    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    /// A request URL could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
