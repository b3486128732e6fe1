//! Integration tests for the auto-refresh credential strategy.
//!
//! These tests verify that the CredentialProvider:
//! - Mints a token on first use and memoizes it
//! - Refreshes exactly once per rejected token
//! - Persists the refreshed token before handing it out
//! - Reports helper and exchange failures as refresh failures

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use clio_core::{
    AutoRefresh, CredentialError, CredentialProvider, HttpTransport, IdentityHelper, Secret,
    StrategyKind, TokenExchange, TokenStore, TransportConfig,
};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

/// Identity helper that counts invocations.
#[derive(Default)]
struct CountingHelper {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl IdentityHelper for CountingHelper {
    async fn identity_token(&self) -> Result<Secret, CredentialError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(CredentialError::RefreshFailed {
                message: "helper unavailable".to_string(),
            });
        }
        Ok(Secret::new(format!("identity-{}", n)))
    }
}

/// Token endpoint answering with a new quoted token per call.
struct SequentialTokens {
    calls: AtomicUsize,
}

impl Respond for SequentialTokens {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        ResponseTemplate::new(200).set_body_string(format!("\"clio-token-{}\"", n))
    }
}

async fn setup(
    server: &MockServer,
    helper: Arc<CountingHelper>,
) -> (CredentialProvider, TokenStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::at(dir.path().join("token.json"));
    let transport = Arc::new(HttpTransport::new(&TransportConfig::default()).unwrap());
    let server_url = Url::parse(&format!("{}/", server.uri())).unwrap();
    let exchange = TokenExchange::new(&server_url, transport).unwrap();

    let provider = CredentialProvider::auto_refresh(AutoRefresh::new(store.clone(), helper, exchange));
    (provider, store, dir)
}

async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v2/server/token"))
        .respond_with(SequentialTokens {
            calls: AtomicUsize::new(0),
        })
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_first_use_mints_and_memoizes() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    let helper = Arc::new(CountingHelper::default());
    let (provider, store, _dir) = setup(&server, helper.clone()).await;

    assert_eq!(provider.strategy_kind(), StrategyKind::AutoRefresh);

    let first = provider.current_token().await.unwrap();
    let second = provider.current_token().await.unwrap();

    assert_eq!(first.expose(), "clio-token-1");
    assert_eq!(first, second);
    assert_eq!(helper.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.load().unwrap().token, first);
}

#[tokio::test]
async fn test_exchange_uses_identity_token_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/server/token"))
        .and(header("authorization", "Bearer identity-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("\"long-lived\""))
        .expect(1)
        .mount(&server)
        .await;
    let helper = Arc::new(CountingHelper::default());
    let (provider, _store, _dir) = setup(&server, helper).await;

    assert_eq!(provider.current_token().await.unwrap().expose(), "long-lived");
}

#[tokio::test]
async fn test_rejection_refreshes_once_and_persists() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    let helper = Arc::new(CountingHelper::default());
    let (provider, store, _dir) = setup(&server, helper.clone()).await;

    let rejected = provider.current_token().await.unwrap();
    let retry = provider.handle_auth_failure(&rejected).await.unwrap();
    assert!(retry);
    assert_eq!(helper.calls.load(Ordering::SeqCst), 2);

    let refreshed = provider.current_token().await.unwrap();
    assert_eq!(refreshed.expose(), "clio-token-2");
    assert_eq!(store.load().unwrap().token, refreshed);
    assert_eq!(helper.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stale_rejection_does_not_refresh_twice() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    let helper = Arc::new(CountingHelper::default());
    let (provider, _store, _dir) = setup(&server, helper.clone()).await;

    let rejected = provider.current_token().await.unwrap();
    assert!(provider.handle_auth_failure(&rejected).await.unwrap());
    // A second request that was rejected with the same old token.
    assert!(provider.handle_auth_failure(&rejected).await.unwrap());

    assert_eq!(helper.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_helper_failure_is_refresh_error() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server).await;
    let helper = Arc::new(CountingHelper {
        calls: AtomicUsize::new(0),
        fail: true,
    });
    let (provider, store, _dir) = setup(&server, helper).await;

    let result = provider.current_token().await;
    assert!(matches!(result, Err(CredentialError::RefreshFailed { .. })));
    assert!(store.load().is_none());
}

#[tokio::test]
async fn test_exchange_failure_is_refresh_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/server/token"))
        .respond_with(ResponseTemplate::new(403).set_body_string("not a Clio user"))
        .mount(&server)
        .await;
    let helper = Arc::new(CountingHelper::default());
    let (provider, _store, _dir) = setup(&server, helper).await;

    match provider.current_token().await {
        Err(CredentialError::RefreshFailed { message }) => {
            assert!(message.contains("not a Clio user"));
        }
        other => panic!("Expected RefreshFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_exchange_body_is_refresh_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/server/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("\"\""))
        .mount(&server)
        .await;
    let helper = Arc::new(CountingHelper::default());
    let (provider, _store, _dir) = setup(&server, helper).await;

    let result = provider.current_token().await;
    assert!(matches!(result, Err(CredentialError::RefreshFailed { .. })));
}
