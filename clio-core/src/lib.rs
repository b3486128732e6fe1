//! # Clio Core
//!
//! Credential handling and HTTP plumbing for the Clio annotation store.
//!
//! This crate provides:
//! - [`TokenStore`] - the on-disk token cache, plus the process-wide
//!   [`default_store()`] behind [`set_token()`]
//! - [`CredentialProvider`] - explicit, cached and auto-refresh token strategies
//! - [`Transport`] - the request capability, implemented by [`HttpTransport`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use clio_core::{CredentialProvider, default_store, set_token};
//!
//! set_token("eyJhbGciOi...")?;
//! let provider = CredentialProvider::cached(default_store().clone());
//! let token = provider.current_token().await?;
//! ```

pub mod credential;
pub mod error;
pub mod identity;
pub mod provider;
pub mod secret;
pub mod token_store;
pub mod transport;

pub use credential::{Credential, parse_token};

pub use error::{CredentialError, TokenStoreError, TransportError};

pub use identity::{CommandIdentityHelper, DEFAULT_IDENTITY_COMMAND, IdentityHelper};

pub use provider::{
    AutoRefresh,
    CredentialProvider,
    CredentialStrategy,
    StrategyKind,
    TokenExchange,
};

pub use secret::Secret;

pub use token_store::{TOKEN_FILE_ENV, TokenStore, default_store, set_token};

pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport, TransportConfig};
