//! Credential backend configuration.
//!
//! Defines the `[portal]` config format selecting which credential backend to
//! use and how to configure it.

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::CredentialStore;

fn default_env_prefix() -> String {
    "CARDKEEP_PORTAL".to_string()
}

/// Configuration for a credential store.
///
/// # Example
///
/// ```toml
/// backend = "env"
/// prefix = "CARDKEEP_PORTAL"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CredentialConfig {
    /// Values stored directly in the config file.
    Inline { username: String, password: String },
    /// Values read from `{prefix}_USERNAME` / `{prefix}_PASSWORD`.
    Env {
        #[serde(default = "default_env_prefix")]
        prefix: String,
    },
}

impl CredentialConfig {
    /// Build a credential store from this configuration.
    pub fn build(&self) -> Box<dyn CredentialStore> {
        match self {
            CredentialConfig::Inline { username, password } => Box::new(
                InlineCredentialStore::new(username.clone(), password.clone()),
            ),
            CredentialConfig::Env { prefix } => Box::new(EnvCredentialStore::new(prefix.clone())),
        }
    }
}

/// Credentials inlined in `cardkeep.toml`.
pub struct InlineCredentialStore {
    username: SecretString,
    password: SecretString,
}

impl InlineCredentialStore {
    pub fn new(username: String, password: String) -> Self {
        Self {
            username: SecretString::from(username),
            password: SecretString::from(password),
        }
    }
}

#[async_trait]
impl CredentialStore for InlineCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        match key {
            "username" => Ok(Some(self.username.clone())),
            "password" => Ok(Some(self.password.clone())),
            _ => Ok(None),
        }
    }
}

/// Credentials read from environment variables. Read-only by nature.
pub struct EnvCredentialStore {
    prefix: String,
}

impl EnvCredentialStore {
    pub fn new(prefix: String) -> Self {
        Self { prefix }
    }

    fn var_name(&self, key: &str) -> String {
        format!("{}_{}", self.prefix, key.to_uppercase())
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        match std::env::var(self.var_name(key)) {
            Ok(value) if !value.is_empty() => Ok(Some(SecretString::from(value))),
            _ => Ok(None),
        }
    }
}
