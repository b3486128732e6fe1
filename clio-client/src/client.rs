//! The caller-facing Clio client.

use std::sync::Arc;

use clio_core::{
    ApiRequest, AutoRefresh, CommandIdentityHelper, CredentialProvider, HttpTransport, IdentityHelper,
    StrategyKind, TokenExchange, TokenStore, Transport, TransportConfig, default_store,
};
use serde_json::Value;
use url::Url;

use crate::annotations::AnnotationClient;
use crate::api::Api;
use crate::config::{ClientConfig, ClientConfigBuilder, CredentialMode};
use crate::dataset::{Dataset, DatasetRegistry};
use crate::error::{ClioError, Result};
use crate::query::AnnotationQuery;
use crate::table::AnnotationTable;
use crate::write::{AnnotationInput, WriteOptions, WriteReport};

/// A client bound to one Clio server and dataset.
///
/// # Example
///
/// ```rust,ignore
/// use clio_client::ClioClient;
///
/// let client = ClioClient::builder().dataset("VNC").build().await?;
/// let table = client.fetch_annotations([154109u64, 24053]).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ClioClient {
    api: Api,
    registry: DatasetRegistry,
    annotations: AnnotationClient,
}

impl ClioClient {
    /// Builder seeded from the `CLIO_*` environment variables.
    ///
    /// Calls on the builder override the environment, so `.token(..)` or
    /// `.cached()` win over `CLIO_APPLICATION_CREDENTIALS`.
    pub fn builder() -> ClioClientBuilder {
        ClioClientBuilder::from_config(ClientConfig::from_env())
    }

    /// Connect using `config`, resolving its dataset against the server.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        Self::assemble(config, None, None).await
    }

    /// Like [`connect`](Self::connect), with a custom identity helper for the
    /// auto-refresh strategy.
    pub async fn connect_with_helper(config: ClientConfig, helper: Arc<dyn IdentityHelper>) -> Result<Self> {
        Self::assemble(config, None, Some(helper)).await
    }

    async fn assemble(
        config: ClientConfig,
        transport: Option<Arc<dyn Transport>>,
        helper: Option<Arc<dyn IdentityHelper>>,
    ) -> Result<Self> {
        config.validate()?;
        let server = config.server_url()?;

        let transport = match transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&TransportConfig {
                timeout: config.timeout,
                tls_verify: config.tls_verify,
                user_agent: config.user_agent.clone(),
            })?),
        };
        let credentials = credential_provider(&config, &server, transport.clone(), helper)?;

        let api = Api::new(server, transport, Arc::new(credentials));
        let registry = DatasetRegistry::new(api.clone());
        let dataset = registry.resolve(config.dataset.as_deref()).await?;

        Ok(Self {
            annotations: AnnotationClient::new(api.clone(), dataset),
            api,
            registry,
        })
    }

    pub fn dataset(&self) -> &Dataset {
        self.annotations.dataset()
    }

    /// Normalized server root.
    pub fn server(&self) -> &Url {
        self.api.server()
    }

    pub fn credential_strategy(&self) -> StrategyKind {
        self.api.credential_strategy()
    }

    /// The annotation operations for the bound dataset.
    pub fn annotations(&self) -> &AnnotationClient {
        &self.annotations
    }

    /// Names of every dataset on the server, fetched live.
    pub async fn list_datasets(&self) -> Result<Vec<String>> {
        self.registry.list_datasets().await
    }

    /// Fetch annotations as a table.
    ///
    /// Accepts an [`AnnotationQuery`] or anything convertible to one, such as
    /// a body id or a list of them.
    pub async fn fetch_annotations(&self, query: impl Into<AnnotationQuery>) -> Result<AnnotationTable> {
        self.annotations.fetch_annotations(&query.into()).await
    }

    /// Write annotations with the default [`WriteOptions`].
    pub async fn set_annotations(&self, input: impl Into<AnnotationInput>) -> Result<WriteReport> {
        self.annotations.set_annotations(input.into(), &WriteOptions::default()).await
    }

    pub async fn set_annotations_with(
        &self,
        input: impl Into<AnnotationInput>,
        options: &WriteOptions,
    ) -> Result<WriteReport> {
        self.annotations.set_annotations(input.into(), options).await
    }

    /// The caller's roles, as the server reports them.
    pub async fn fetch_roles(&self) -> Result<Value> {
        let request = ApiRequest::get(self.api.endpoint(&["v2", "roles"])?);
        self.api.json(&request).await
    }

    /// Point annotations of `group`, or the caller's own when `None`.
    pub async fn fetch_group_annotations(&self, group: Option<&str>) -> Result<AnnotationTable> {
        self.annotations.fetch_group_annotations(group).await
    }
}

fn credential_provider(
    config: &ClientConfig,
    server: &Url,
    transport: Arc<dyn Transport>,
    helper: Option<Arc<dyn IdentityHelper>>,
) -> Result<CredentialProvider> {
    let store = || match &config.token_path {
        Some(path) => TokenStore::at(path.clone()),
        None => default_store().clone(),
    };

    let provider = match &config.credential {
        CredentialMode::Explicit(token) => CredentialProvider::explicit(token.clone()),
        CredentialMode::Cached => CredentialProvider::cached(store()),
        CredentialMode::AutoRefresh => {
            let helper: Arc<dyn IdentityHelper> = match helper {
                Some(helper) => helper,
                None => Arc::new(CommandIdentityHelper::from_command(&config.identity_command).ok_or_else(
                    || ClioError::Config("auto-refresh requires an identity command".to_string()),
                )?),
            };
            let exchange = TokenExchange::new(server, transport)?;
            CredentialProvider::auto_refresh(AutoRefresh::new(store(), helper, exchange))
        }
    };
    Ok(provider)
}

/// Builder for [`ClioClient`].
///
/// Wraps a [`ClientConfigBuilder`]; [`build`](Self::build) validates the
/// configuration, then connects and resolves the dataset.
#[derive(Default)]
pub struct ClioClientBuilder {
    config: ClientConfigBuilder,
    transport: Option<Arc<dyn Transport>>,
    helper: Option<Arc<dyn IdentityHelper>>,
}

impl ClioClientBuilder {
    /// Start from an existing configuration, e.g. [`ClientConfig::load`].
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config: ClientConfigBuilder::from_config(config),
            ..Default::default()
        }
    }

    /// Adjust the underlying configuration builder.
    pub fn configure(mut self, f: impl FnOnce(ClientConfigBuilder) -> ClientConfigBuilder) -> Self {
        self.config = f(self.config);
        self
    }

    pub fn server(self, server: impl Into<String>) -> Self {
        self.configure(|c| c.server(server))
    }

    pub fn dataset(self, dataset: impl Into<String>) -> Self {
        self.configure(|c| c.dataset(dataset))
    }

    pub fn token(self, token: impl Into<clio_core::Secret>) -> Self {
        self.configure(|c| c.token(token))
    }

    pub fn cached(self) -> Self {
        self.configure(ClientConfigBuilder::cached)
    }

    pub fn auto_refresh(self) -> Self {
        self.configure(ClientConfigBuilder::auto_refresh)
    }

    pub fn token_path(self, path: impl Into<std::path::PathBuf>) -> Self {
        self.configure(|c| c.token_path(path))
    }

    pub fn allow_insecure_http(self, allow: bool) -> Self {
        self.configure(|c| c.allow_insecure_http(allow))
    }

    /// Identity helper for the auto-refresh strategy, replacing the command.
    pub fn identity_helper(mut self, helper: Arc<dyn IdentityHelper>) -> Self {
        self.helper = Some(helper);
        self
    }

    /// Send requests through `transport` instead of the default HTTP client.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub async fn build(self) -> Result<ClioClient> {
        let config = self.config.build()?;
        ClioClient::assemble(config, self.transport, self.helper).await
    }
}

impl std::fmt::Debug for ClioClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClioClientBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .field("custom_helper", &self.helper.is_some())
            .finish()
    }
}
