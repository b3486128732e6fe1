//! "Send a request, get JSON back" capability.
//!
//! [`Transport`] is the seam between the credential/annotation logic and the
//! network. [`HttpTransport`] implements it with `reqwest`; timeouts and TLS
//! verification are configured here and nowhere else.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::TransportError;
use crate::secret::Secret;

/// Query parameter identifying this client to the server.
pub const APP_PARAM: &str = "app";

/// Value sent in the [`APP_PARAM`] query parameter.
pub const APP_ID: &str = "clio-rs";

/// A single request against the Clio API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: None,
        }
    }

    pub fn post(url: Url, body: Option<serde_json::Value>) -> Self {
        Self {
            method: Method::POST,
            url,
            body,
        }
    }
}

/// Raw response: status plus body text.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    /// Whether the server refused the bearer token (401/403).
    pub fn is_auth_rejection(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED.as_u16() || self.status == StatusCode::FORBIDDEN.as_u16()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-success response into a [`TransportError::Status`].
    pub fn error_for_status(self, request: &ApiRequest) -> Result<Self, TransportError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(TransportError::Status {
            method: request.method.to_string(),
            url: request.url.to_string(),
            status: self.status,
            message: error_message(&self.body, self.status),
        })
    }

    /// Check the status and deserialize the JSON body.
    pub fn json<T: DeserializeOwned>(self, request: &ApiRequest) -> Result<T, TransportError> {
        let response = self.error_for_status(request)?;
        serde_json::from_str(&response.body).map_err(|e| TransportError::InvalidResponse {
            url: request.url.to_string(),
            message: format!("{} (body: {})", e, truncate(&response.body, 200)),
        })
    }
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str, status: u16) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        ["detail", "error", "message"]
            .iter()
            .find_map(|key| v.get(key))
            .map(|m| m.as_str().map(str::to_string).unwrap_or_else(|| m.to_string()))
    });

    from_json.unwrap_or_else(|| {
        let body = body.trim();
        if body.is_empty() {
            StatusCode::from_u16(status)
                .map(|s| s.to_string())
                .unwrap_or_else(|_| status.to_string())
        } else {
            truncate(body, 500).to_string()
        }
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Capability to send authenticated requests.
///
/// Implementations report every HTTP status as an [`ApiResponse`]; only
/// failures to get a response at all are errors. Auth handling lives above
/// this layer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest, token: &Secret) -> Result<ApiResponse, TransportError>;
}

/// Settings passed straight through to the HTTP client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Request timeout.
    pub timeout: Duration,
    /// Whether to verify TLS certificates.
    pub tls_verify: bool,
    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            tls_verify: true,
            user_agent: format!("clio-rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("clio-rs")),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.tls_verify)
            .build()?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest, token: &Secret) -> Result<ApiResponse, TransportError> {
        let url = with_app_identifier(&request.url);
        let start = Instant::now();

        tracing::debug!(method = %request.method, path = %url.path(), "Sending request");

        let mut builder = self
            .http
            .request(request.method.clone(), url.clone())
            .header(AUTHORIZATION, token.bearer_header());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(
            method = %request.method,
            path = %url.path(),
            status = status,
            duration_ms = %start.elapsed().as_millis(),
            "Received response"
        );

        Ok(ApiResponse { status, body })
    }
}

/// Add `app=clio-rs` unless the URL already names an app.
pub fn with_app_identifier(url: &Url) -> Url {
    if url.query_pairs().any(|(k, _)| k == APP_PARAM) {
        return url.clone();
    }
    let mut url = url.clone();
    url.query_pairs_mut().append_pair(APP_PARAM, APP_ID);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(url: &str) -> ApiRequest {
        ApiRequest::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_app_identifier_added_once() {
        let url = Url::parse("https://clio.example.org/v2/datasets").unwrap();
        let tagged = with_app_identifier(&url);
        assert_eq!(tagged.query(), Some("app=clio-rs"));
        assert_eq!(with_app_identifier(&tagged), tagged);

        let custom = Url::parse("https://clio.example.org/v2/datasets?app=other").unwrap();
        assert_eq!(with_app_identifier(&custom).query(), Some("app=other"));
    }

    #[test]
    fn test_auth_rejection_statuses() {
        for status in [401, 403] {
            let response = ApiResponse { status, body: String::new() };
            assert!(response.is_auth_rejection());
        }
        let response = ApiResponse { status: 500, body: String::new() };
        assert!(!response.is_auth_rejection());
    }

    #[test]
    fn test_error_message_prefers_json_detail() {
        let req = request("https://clio.example.org/v2/datasets");
        let response = ApiResponse {
            status: 400,
            body: r#"{"detail": "bad bodyid"}"#.to_string(),
        };
        match response.error_for_status(&req) {
            Err(TransportError::Status { status, message, .. }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad bodyid");
            }
            other => panic!("Expected Status error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_error_body_uses_reason_phrase() {
        let req = request("https://clio.example.org/v2/datasets");
        let response = ApiResponse { status: 502, body: String::new() };
        let err = response.error_for_status(&req).unwrap_err();
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[test]
    fn test_invalid_json_is_invalid_response() {
        let req = request("https://clio.example.org/v2/datasets");
        let response = ApiResponse { status: 200, body: "<html>".to_string() };
        let result: Result<serde_json::Value, _> = response.json(&req);
        assert!(matches!(result, Err(TransportError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_http_transport_sends_bearer_and_app() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/roles"))
            .and(query_param("app", "clio-rs"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"VNC": ["clio_general"]})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&TransportConfig::default()).unwrap();
        let req = request(&format!("{}/v2/roles", server.uri()));
        let response = transport.send(&req, &Secret::new("tok-1")).await.unwrap();

        assert_eq!(response.status, 200);
        let roles: serde_json::Value = response.json(&req).unwrap();
        assert_eq!(roles["VNC"][0], "clio_general");
    }

    #[tokio::test]
    async fn test_http_transport_reports_rejections_as_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&TransportConfig::default()).unwrap();
        let req = request(&format!("{}/v2/datasets", server.uri()));
        let response = transport.send(&req, &Secret::new("stale")).await.unwrap();

        assert!(response.is_auth_rejection());
    }
}
