//! Dataset resolution.

use std::collections::BTreeSet;

use clio_core::ApiRequest;
use serde_json::Value;
use url::Url;

use crate::api::Api;
use crate::error::{ClioError, Result};

/// A dataset the server lists, with its annotation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    name: String,
    endpoint: Url,
}

impl Dataset {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<server>/v2/json-annotations/<name>`.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Looks up dataset names against the live server list.
#[derive(Debug, Clone)]
pub struct DatasetRegistry {
    api: Api,
}

impl DatasetRegistry {
    pub fn new(api: Api) -> Self {
        Self { api }
    }

    /// Names of all datasets the server lists, sorted. Never cached.
    pub async fn list_datasets(&self) -> Result<Vec<String>> {
        let request = ApiRequest::get(self.api.endpoint(&["v2", "datasets"])?);
        let listing: Value = self.api.json(&request).await?;
        dataset_names(listing).map_err(|message| {
            clio_core::TransportError::InvalidResponse {
                url: request.url.to_string(),
                message,
            }
            .into()
        })
    }

    /// Resolve `name` against the server's list.
    ///
    /// Fails with [`ClioError::DatasetRequired`] when `name` is absent or
    /// unknown. The list is fetched in both cases so the error can name every
    /// valid choice.
    pub async fn resolve(&self, name: Option<&str>) -> Result<Dataset> {
        let requested = name.map(str::trim).filter(|n| !n.is_empty());
        let available = self.list_datasets().await?;

        match requested {
            Some(name) if available.iter().any(|a| a == name) => {
                let endpoint = self.api.endpoint(&["v2", "json-annotations", name])?;
                tracing::info!(dataset = name, endpoint = %endpoint, "Resolved dataset");
                Ok(Dataset {
                    name: name.to_string(),
                    endpoint,
                })
            }
            _ => Err(ClioError::DatasetRequired {
                requested: requested.map(str::to_string),
                available,
            }),
        }
    }
}

/// Dataset names from either an object keyed by name or an array of names.
fn dataset_names(listing: Value) -> std::result::Result<Vec<String>, String> {
    let names: BTreeSet<String> = match listing {
        Value::Object(map) => map.into_iter().map(|(name, _)| name).collect(),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(name) => Ok(name),
                Value::Object(mut obj) => match obj.remove("name") {
                    Some(Value::String(name)) => Ok(name),
                    _ => Err("dataset entry without a name".to_string()),
                },
                other => Err(format!("unexpected dataset entry {}", other)),
            })
            .collect::<std::result::Result<_, _>>()?,
        Value::Null => BTreeSet::new(),
        other => return Err(format!("unexpected dataset listing {}", other)),
    };
    Ok(names.into_iter().collect())
}
