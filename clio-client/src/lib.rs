//! # Clio Client
//!
//! Read and write neuron annotations stored in a Clio server, as tables.
//!
//! A [`ClioClient`] is bound to one dataset, resolved against the server's
//! live list when the client is built. Tokens come from one of three
//! strategies (see [`CredentialMode`]); a rejected token is refreshed and the
//! request retried once when the strategy allows it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use clio_client::{AnnotationInput, ClioClient, set_token};
//! use serde_json::json;
//!
//! set_token("eyJhbGciOi...")?;
//! let client = ClioClient::builder().dataset("VNC").build().await?;
//!
//! let records = json!({"154109": {"soma_side": "LHS"}});
//! client.set_annotations(AnnotationInput::from_json(records)?).await?;
//!
//! let table = client.fetch_annotations(154109u64).await?;
//! assert_eq!(table.get(0, "soma_side"), Some(&json!("LHS")));
//! ```

pub mod annotations;
pub mod api;
pub mod client;
pub mod config;
pub mod dataset;
pub mod error;
pub mod query;
pub mod table;
pub mod write;

pub use annotations::AnnotationClient;
pub use api::Api;
pub use client::{ClioClient, ClioClientBuilder};
pub use config::{ClientConfig, ClientConfigBuilder, CredentialMode};
pub use dataset::{Dataset, DatasetRegistry};
pub use error::{ClioError, Result};
pub use query::{AnnotationQuery, QueryBuilder};
pub use table::{AnnotationTable, BODYID, BodyId, Row};
pub use write::{AnnotationInput, RecordUpdate, WriteFailure, WriteOptions, WriteReport};

pub use clio_core::{CredentialError, Secret, StrategyKind, TransportError, set_token};
