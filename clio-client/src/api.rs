//! Authenticated request execution.
//!
//! [`Api`] pairs a [`Transport`] with a [`CredentialProvider`] and applies the
//! one retry rule every call path shares: a 401/403 is reported to the
//! provider, and the request is sent again exactly once if the provider says
//! a fresh token is available. Anything else surfaces immediately.

use std::sync::Arc;

use clio_core::{ApiRequest, ApiResponse, CredentialProvider, StrategyKind, Transport};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{ClioError, Result};

/// Server root plus the means to talk to it.
#[derive(Clone)]
pub struct Api {
    server: Url,
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialProvider>,
}

impl Api {
    /// `server` is the normalized server root.
    pub fn new(server: Url, transport: Arc<dyn Transport>, credentials: Arc<CredentialProvider>) -> Self {
        Self {
            server,
            transport,
            credentials,
        }
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    pub fn credential_strategy(&self) -> StrategyKind {
        self.credentials.strategy_kind()
    }

    /// `<server>/<segments...>`, each segment percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        extend_url(&self.server, segments)
    }

    /// Send `request`, retrying once after a recoverable auth rejection.
    ///
    /// Returns the successful response; non-success statuses become
    /// [`ClioError::Transport`], unrecoverable rejections
    /// [`ClioError::Credential`].
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let token = self.credentials.current_token().await?;
        let response = self.transport.send(request, &token).await?;
        if !response.is_auth_rejection() {
            return Ok(response.error_for_status(request)?);
        }

        tracing::warn!(
            method = %request.method,
            path = %request.url.path(),
            status = response.status,
            "Clio rejected the token"
        );
        if !self.credentials.handle_auth_failure(&token).await? {
            return Err(self.credentials.rejection_error().into());
        }

        let token = self.credentials.current_token().await?;
        let response = self.transport.send(request, &token).await?;
        if response.is_auth_rejection() {
            tracing::warn!(status = response.status, "Refreshed token was rejected as well");
            return Err(self.credentials.rejection_error().into());
        }
        Ok(response.error_for_status(request)?)
    }

    /// [`execute`](Self::execute) and deserialize the JSON body.
    pub async fn json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let response = self.execute(request).await?;
        Ok(response.json(request)?)
    }
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field("server", &self.server.as_str())
            .field("credentials", &self.credentials.strategy_kind())
            .finish_non_exhaustive()
    }
}

/// Append path segments to `base`, ignoring a trailing slash on it.
pub(crate) fn extend_url(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ClioError::Config(format!("'{}' cannot be used as a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
