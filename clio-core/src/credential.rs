//! The bearer credential handed out by a [`CredentialProvider`](crate::CredentialProvider).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::secret::Secret;

/// A bearer token with optional expiry metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The token value.
    pub token: Secret,

    /// When this token expires (None if unknown).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Create a credential with unknown expiry.
    pub fn new(token: impl Into<Secret>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// Attach an expiration time.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Check if this credential has expired.
    ///
    /// Returns `false` if no expiration is set; the service is then the only
    /// judge of validity.
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| exp < Utc::now()).unwrap_or(false)
    }
}

/// Normalize a token as users paste it.
///
/// Accepts either the bare token string or the whole JSON document the Clio
/// web UI hands out (`{"token": "..."}`). Surrounding whitespace and double
/// quotes are stripped. Returns `None` when nothing usable remains.
pub fn parse_token(raw: &str) -> Option<Secret> {
    let raw = raw.trim();

    let token = if raw.starts_with('{') {
        let doc: serde_json::Value = serde_json::from_str(raw).ok()?;
        doc.get("token")?.as_str()?.to_string()
    } else {
        raw.to_string()
    };

    let token = token.replace('"', "");
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(Secret::new(token))
    }
}
