//! Credential storage abstraction.
//!
//! The portal login needs a username and password; where they come from is a
//! backend decision. Inline TOML values are the simple default, environment
//! variables keep the config file free of secrets.
//!
//! # Configuration
//!
//! The `[portal]` section of `cardkeep.toml` selects the backend:
//!
//! ```toml
//! [portal]
//! backend = "inline"
//! username = "israel"
//! password = "hunter2"
//! ```

mod config;
mod session;

pub use config::{CredentialConfig, EnvCredentialStore, InlineCredentialStore};
pub use session::{SessionCache, SessionData, SESSION_MAX_AGE};

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

/// A key-value store for credentials.
///
/// The interface is intentionally simple - just get by key name. The portal
/// defines what keys it needs ("username", "password"), and the backend
/// configuration maps those keys to backend-specific locations.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve a credential by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    /// Returns `Err` if there was an error accessing the backend.
    async fn get(&self, key: &str) -> Result<Option<SecretString>>;
}

/// Login credentials for the card portal.
pub struct PortalCredentials {
    pub username: String,
    pub password: SecretString,
}

impl PortalCredentials {
    /// Resolve both portal keys from a store, failing with the missing key's
    /// name rather than a generic error.
    pub async fn from_store(store: &dyn CredentialStore) -> Result<Self> {
        let username = store
            .get("username")
            .await?
            .context("Portal credential 'username' is not configured")?;
        let password = store
            .get("password")
            .await?
            .context("Portal credential 'password' is not configured")?;

        Ok(Self {
            username: username.expose_secret().to_string(),
            password,
        })
    }
}
