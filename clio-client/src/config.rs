//! Client configuration and builder pattern.
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! an optional `client.toml` in the platform config directory, and `CLIO_*`
//! environment variables. The builder sits on top for programmatic use.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clio_core::{DEFAULT_IDENTITY_COMMAND, Secret, TOKEN_FILE_ENV, parse_token};
use directories::ProjectDirs;
use serde::Deserialize;
use url::Url;

use crate::error::{ClioError, Result};

/// Production Clio server.
pub const DEFAULT_SERVER: &str = "https://clio-store-vwzoicitea-uk.a.run.app";

pub const SERVER_ENV: &str = "CLIO_SERVER";
pub const DATASET_ENV: &str = "CLIO_DATASET";
/// Explicit token; either the bare token or the JSON document holding it.
pub const CREDENTIALS_ENV: &str = "CLIO_APPLICATION_CREDENTIALS";

const CONFIG_FILE_NAME: &str = "client.toml";

/// How the client obtains its bearer token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CredentialMode {
    /// Use this token as is.
    Explicit(Secret),
    /// Read the token saved by `set_token`.
    #[default]
    Cached,
    /// Mint tokens with the identity command and refresh them on rejection.
    AutoRefresh,
}

/// Configuration for the Clio client.
///
/// # Security
///
/// An explicit token is a [`Secret`], so `Debug` output never shows it.
#[derive(Clone)]
pub struct ClientConfig {
    /// Server root, e.g. `https://clio-store.example.org`.
    pub server: String,
    /// Dataset to bind to. Required to connect.
    pub dataset: Option<String>,
    pub credential: CredentialMode,
    /// Request timeout (default: 30 seconds)
    pub timeout: Duration,
    /// Whether to verify TLS certificates (default: true)
    pub tls_verify: bool,
    /// User-Agent header value
    pub user_agent: String,
    /// Token file for the cached and auto-refresh strategies. `None` uses the
    /// process-wide default store.
    pub token_path: Option<PathBuf>,
    /// Program and arguments printing an identity token (auto-refresh only).
    pub identity_command: Vec<String>,
    /// Permit `http://` servers. Only meant for local servers and tests.
    pub allow_insecure_http: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            dataset: None,
            credential: CredentialMode::default(),
            timeout: Duration::from_secs(30),
            tls_verify: true,
            user_agent: format!("clio-rs/{}", env!("CARGO_PKG_VERSION")),
            token_path: None,
            identity_command: DEFAULT_IDENTITY_COMMAND.iter().map(|s| s.to_string()).collect(),
            allow_insecure_http: false,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server", &self.server)
            .field("dataset", &self.dataset)
            .field("credential", &self.credential)
            .field("timeout", &self.timeout)
            .field("tls_verify", &self.tls_verify)
            .field("user_agent", &self.user_agent)
            .field("token_path", &self.token_path)
            .field("identity_command", &self.identity_command)
            .field("allow_insecure_http", &self.allow_insecure_http)
            .finish()
    }
}

/// On-disk form of `client.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    server: Option<String>,
    dataset: Option<String>,
    /// `"cached"` or `"auto-refresh"`. Tokens never live in this file.
    credential: Option<String>,
    timeout_secs: Option<f64>,
    tls_verify: Option<bool>,
    user_agent: Option<String>,
    token_path: Option<PathBuf>,
    identity_command: Option<Vec<String>>,
    allow_insecure_http: Option<bool>,
}

impl ClientConfig {
    /// Minimum allowed timeout value.
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);

    /// Create a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Defaults, overlaid with `client.toml` (if present) and the environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = default_config_path().filter(|p| p.exists()) {
            config.merge_file(&path)?;
        }
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Defaults overlaid with the `CLIO_*` environment only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Defaults overlaid with the TOML file at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        config.merge_file(path.as_ref())?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClioError::Config(format!("Failed to read config from {:?}: {}", path, e)))?;
        let file: FileConfig = toml::from_str(&contents)
            .map_err(|e| ClioError::Config(format!("Failed to parse config from {:?}: {}", path, e)))?;
        tracing::debug!("Loaded client configuration from {:?}", path);

        if let Some(server) = file.server {
            self.server = server;
        }
        if file.dataset.is_some() {
            self.dataset = file.dataset;
        }
        match file.credential.as_deref() {
            None => {}
            Some("cached") => self.credential = CredentialMode::Cached,
            Some("auto-refresh") => self.credential = CredentialMode::AutoRefresh,
            Some(other) => {
                return Err(ClioError::Config(format!(
                    "unknown credential mode '{}' in {:?}; expected 'cached' or 'auto-refresh'",
                    other, path
                )));
            }
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout = Duration::try_from_secs_f64(secs)
                .map_err(|e| ClioError::Config(format!("invalid timeout_secs {}: {}", secs, e)))?;
        }
        if let Some(verify) = file.tls_verify {
            self.tls_verify = verify;
        }
        if let Some(agent) = file.user_agent {
            self.user_agent = agent;
        }
        if file.token_path.is_some() {
            self.token_path = file.token_path;
        }
        if let Some(command) = file.identity_command {
            self.identity_command = command;
        }
        if let Some(allow) = file.allow_insecure_http {
            self.allow_insecure_http = allow;
        }
        Ok(())
    }

    /// Apply `CLIO_*` variables as returned by `var`.
    ///
    /// A token in [`CREDENTIALS_ENV`] switches to the explicit strategy.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(server) = get(SERVER_ENV) {
            self.server = server;
        }
        if let Some(dataset) = get(DATASET_ENV) {
            self.dataset = Some(dataset);
        }
        if let Some(path) = get(TOKEN_FILE_ENV) {
            self.token_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = get(CREDENTIALS_ENV) {
            match parse_token(&raw) {
                Some(token) => self.credential = CredentialMode::Explicit(token),
                None => tracing::warn!("Ignoring {}: it holds no usable token", CREDENTIALS_ENV),
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.server_url()?;

        if self.timeout < Self::MIN_TIMEOUT {
            return Err(ClioError::Config(format!(
                "timeout ({:?}) must be >= {:?}",
                self.timeout,
                Self::MIN_TIMEOUT
            )));
        }

        match &self.credential {
            CredentialMode::Explicit(token) if token.expose().trim().is_empty() => {
                return Err(ClioError::Config("explicit token cannot be empty".to_string()));
            }
            CredentialMode::AutoRefresh if self.identity_command.is_empty() => {
                return Err(ClioError::Config(
                    "auto-refresh requires an identity command".to_string(),
                ));
            }
            _ => {}
        }

        Ok(())
    }

    /// The normalized server root, always ending in `/`.
    pub fn server_url(&self) -> Result<Url> {
        normalize_server(&self.server, self.allow_insecure_http)
    }
}

/// Path of `client.toml` in the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "janelia", "clio").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Normalize a server address.
///
/// A missing scheme means `https://`. `http://` is refused unless
/// `allow_insecure_http` is set; other schemes always are. Trailing slashes
/// are collapsed into exactly one, so relative joins stay under the root.
pub fn normalize_server(raw: &str, allow_insecure_http: bool) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ClioError::Config("server cannot be empty".to_string()));
    }

    let address = match raw.split_once("://") {
        None => format!("https://{}", raw),
        Some(("https", _)) => raw.to_string(),
        Some(("http", _)) if allow_insecure_http => raw.to_string(),
        Some(("http", _)) => {
            return Err(ClioError::Config(format!(
                "server must be https, not http: {}",
                raw
            )));
        }
        Some((scheme, _)) => {
            return Err(ClioError::Config(format!("unknown protocol '{}' in server {}", scheme, raw)));
        }
    };

    let url = Url::parse(&format!("{}/", address.trim_end_matches('/')))
        .map_err(|e| ClioError::Config(format!("Invalid server '{}': {}", raw, e)))?;
    if url.host().is_none() {
        return Err(ClioError::Config(format!("server '{}' has no host", raw)));
    }
    Ok(url)
}

/// Builder for client configuration.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder starting from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, e.g. [`ClientConfig::load`].
    pub fn from_config(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.config.server = server.into();
        self
    }

    pub fn dataset(mut self, dataset: impl Into<String>) -> Self {
        self.config.dataset = Some(dataset.into());
        self
    }

    /// Use this token for the client's lifetime.
    pub fn token(mut self, token: impl Into<Secret>) -> Self {
        self.config.credential = CredentialMode::Explicit(token.into());
        self
    }

    /// Read the token saved by `set_token`.
    pub fn cached(mut self) -> Self {
        self.config.credential = CredentialMode::Cached;
        self
    }

    /// Mint and refresh tokens through the identity command.
    pub fn auto_refresh(mut self) -> Self {
        self.config.credential = CredentialMode::AutoRefresh;
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set whether to verify TLS certificates.
    pub fn tls_verify(mut self, verify: bool) -> Self {
        self.config.tls_verify = verify;
        self
    }

    /// Set a custom User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.token_path = Some(path.into());
        self
    }

    pub fn identity_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.identity_command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn allow_insecure_http(mut self, allow: bool) -> Self {
        self.config.allow_insecure_http = allow;
        self
    }

    /// Build the configuration, validating all settings.
    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
