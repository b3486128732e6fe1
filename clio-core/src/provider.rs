//! Credential lifecycle management.
//!
//! A [`CredentialProvider`] owns one [`CredentialStrategy`], chosen at
//! construction and never re-selected:
//!
//! - **Explicit**: the caller's token, used verbatim and never refreshed.
//! - **Cached**: the token saved in a [`TokenStore`] (see
//!   [`set_token`](crate::set_token)).
//! - **AutoRefresh**: an identity token from an external helper, exchanged
//!   for a long-lived Clio token and persisted to the store. This is the only
//!   strategy that recovers from a rejected token on its own.
//!
//! The resolved token is memoized for the provider's lifetime. Callers report
//! a rejected token through [`CredentialProvider::handle_auth_failure`], which
//! says whether a single retry is warranted.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use url::Url;

use crate::credential::{Credential, parse_token};
use crate::error::{CredentialError, TransportError};
use crate::identity::IdentityHelper;
use crate::secret::Secret;
use crate::token_store::TokenStore;
use crate::transport::{ApiRequest, Transport};

/// Path of the long-lived token endpoint, relative to the server root.
pub const TOKEN_EXCHANGE_PATH: &str = "v2/server/token";

/// Which strategy a provider uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Explicit,
    Cached,
    AutoRefresh,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::Cached => write!(f, "cached"),
            Self::AutoRefresh => write!(f, "auto-refresh"),
        }
    }
}

/// Trades an identity token for a long-lived Clio token.
#[derive(Clone)]
pub struct TokenExchange {
    url: Url,
    transport: Arc<dyn Transport>,
}

impl TokenExchange {
    /// Exchange against `<server>/v2/server/token`.
    pub fn new(server: &Url, transport: Arc<dyn Transport>) -> Result<Self, TransportError> {
        let url = server
            .join(TOKEN_EXCHANGE_PATH)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", server, e)))?;
        Ok(Self { url, transport })
    }

    async fn exchange(&self, identity: &Secret) -> Result<Secret, CredentialError> {
        let request = ApiRequest::post(self.url.clone(), None);
        let response = self
            .transport
            .send(&request, identity)
            .await
            .and_then(|r| r.error_for_status(&request))
            .map_err(|e| CredentialError::RefreshFailed {
                message: format!("unable to retrieve long-lived Clio token: {}", e),
            })?;

        parse_token(&response.body).ok_or_else(|| CredentialError::RefreshFailed {
            message: "token endpoint returned an empty token".to_string(),
        })
    }
}

impl fmt::Debug for TokenExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenExchange").field("url", &self.url.as_str()).finish()
    }
}

/// Settings for the auto-refresh strategy.
#[derive(Clone)]
pub struct AutoRefresh {
    store: TokenStore,
    helper: Arc<dyn IdentityHelper>,
    exchange: TokenExchange,
}

impl AutoRefresh {
    pub fn new(store: TokenStore, helper: Arc<dyn IdentityHelper>, exchange: TokenExchange) -> Self {
        Self {
            store,
            helper,
            exchange,
        }
    }

    /// Mint a fresh token and persist it before handing it out.
    async fn refresh(&self) -> Result<Secret, CredentialError> {
        let identity = self.helper.identity_token().await?;
        let token = self.exchange.exchange(&identity).await?;
        self.store.save(&Credential::new(token.clone()))?;
        tracing::info!("Refreshed Clio token and saved it to {:?}", self.store.path());
        Ok(token)
    }
}

impl fmt::Debug for AutoRefresh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoRefresh")
            .field("store", &self.store)
            .field("exchange", &self.exchange)
            .finish_non_exhaustive()
    }
}

/// How a provider obtains its token.
#[derive(Debug, Clone)]
pub enum CredentialStrategy {
    Explicit(Secret),
    Cached(TokenStore),
    AutoRefresh(AutoRefresh),
}

impl CredentialStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Explicit(_) => StrategyKind::Explicit,
            Self::Cached(_) => StrategyKind::Cached,
            Self::AutoRefresh(_) => StrategyKind::AutoRefresh,
        }
    }
}

/// Supplies bearer tokens and decides what to do when one is rejected.
#[derive(Debug)]
pub struct CredentialProvider {
    strategy: CredentialStrategy,
    current: Mutex<Option<Secret>>,
}

impl CredentialProvider {
    pub fn new(strategy: CredentialStrategy) -> Self {
        tracing::info!("Using {} credential strategy", strategy.kind());
        Self {
            strategy,
            current: Mutex::new(None),
        }
    }

    /// Provider for a caller-supplied token.
    pub fn explicit(token: impl Into<Secret>) -> Self {
        Self::new(CredentialStrategy::Explicit(token.into()))
    }

    /// Provider reading from a token file.
    pub fn cached(store: TokenStore) -> Self {
        Self::new(CredentialStrategy::Cached(store))
    }

    /// Provider minting tokens through an identity helper.
    pub fn auto_refresh(settings: AutoRefresh) -> Self {
        Self::new(CredentialStrategy::AutoRefresh(settings))
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// The token to use for the next request.
    ///
    /// Resolved on first use and memoized; later calls return the same token
    /// without touching the store, the helper or the network until a
    /// rejection is reported.
    pub async fn current_token(&self) -> Result<Secret, CredentialError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            return Ok(token.clone());
        }

        let token = match &self.strategy {
            CredentialStrategy::Explicit(token) => token.clone(),
            CredentialStrategy::Cached(store) => {
                let credential = store.load().ok_or_else(|| CredentialError::Missing {
                    path: store.path().to_path_buf(),
                })?;
                if credential.is_expired() {
                    tracing::warn!("Cached token at {:?} is past its recorded expiry", store.path());
                }
                credential.token
            }
            CredentialStrategy::AutoRefresh(settings) => settings.refresh().await?,
        };

        *current = Some(token.clone());
        Ok(token)
    }

    /// React to the service rejecting `rejected`.
    ///
    /// Returns `true` when a fresh token is now available and the request
    /// should be retried once. Only auto-refresh ever returns `true`. If
    /// another caller already replaced the rejected token, no second refresh
    /// is run. A cached provider forgets its token so the next call re-reads
    /// the store, picking up a token set out of band.
    pub async fn handle_auth_failure(&self, rejected: &Secret) -> Result<bool, CredentialError> {
        let mut current = self.current.lock().await;

        match &self.strategy {
            CredentialStrategy::Explicit(_) => Ok(false),
            CredentialStrategy::Cached(_) => {
                if current.as_ref() == Some(rejected) {
                    *current = None;
                }
                Ok(false)
            }
            CredentialStrategy::AutoRefresh(settings) => {
                if current.as_ref().is_some_and(|token| token != rejected) {
                    tracing::debug!("Token already refreshed by another request");
                    return Ok(true);
                }
                tracing::info!("Clio rejected the current token, refreshing");
                *current = None;
                let token = settings.refresh().await?;
                *current = Some(token);
                Ok(true)
            }
        }
    }

    /// The error to surface when a rejection cannot be recovered from.
    pub fn rejection_error(&self) -> CredentialError {
        let hint = match &self.strategy {
            CredentialStrategy::Explicit(_) => {
                "the token is expired or invalid; construct the client with a new token".to_string()
            }
            CredentialStrategy::Cached(store) => format!(
                "the cached token at {} is stale; call set_token() with a fresh token",
                store.path().display()
            ),
            CredentialStrategy::AutoRefresh(_) => {
                "a freshly minted token was rejected too; check that your account has access".to_string()
            }
        };
        CredentialError::Expired {
            strategy: self.strategy_kind(),
            hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_explicit_is_memoized_and_never_refreshes() {
        let provider = CredentialProvider::explicit("tok");
        assert_eq!(provider.current_token().await.unwrap().expose(), "tok");
        assert_eq!(provider.current_token().await.unwrap().expose(), "tok");

        let retry = provider.handle_auth_failure(&Secret::new("tok")).await.unwrap();
        assert!(!retry);
        assert!(matches!(
            provider.rejection_error(),
            CredentialError::Expired { strategy: StrategyKind::Explicit, .. }
        ));
    }

    #[tokio::test]
    async fn test_cached_missing_file() {
        let dir = TempDir::new().unwrap();
        let provider = CredentialProvider::cached(TokenStore::at(dir.path().join("token.json")));

        match provider.current_token().await {
            Err(CredentialError::Missing { path }) => assert!(path.ends_with("token.json")),
            other => panic!("Expected Missing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cached_is_memoized_until_rejected() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::at(dir.path().join("token.json"));
        store.save(&Credential::new("first")).unwrap();
        let provider = CredentialProvider::cached(store.clone());

        let first = provider.current_token().await.unwrap();
        store.save(&Credential::new("second")).unwrap();
        assert_eq!(provider.current_token().await.unwrap(), first);

        assert!(!provider.handle_auth_failure(&first).await.unwrap());
        assert_eq!(provider.current_token().await.unwrap().expose(), "second");
    }

    #[test]
    fn test_cached_rejection_error_points_at_set_token() {
        let provider = CredentialProvider::cached(TokenStore::at("/tmp/clio-test/token.json"));
        let msg = provider.rejection_error().to_string();
        assert!(msg.contains("set_token"));
        assert!(msg.contains("cached"));
    }
}
