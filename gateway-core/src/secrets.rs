//! Named secrets used to build default provider configurations.
//!
//! Adapters never read the process environment directly. They go through a
//! `SecretStore`, so tests and embedders can swap in their own backend.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::{Error, ErrorDetails};

pub const ENV_SECRET_PREFIX: &str = "GATEWAY_SECRET_";

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns `None` when the secret is not set.
    async fn get_optional(&self, name: &str) -> Result<Option<SecretString>, Error>;

    async fn get(&self, name: &str) -> Result<SecretString, Error> {
        self.get_optional(name).await?.ok_or_else(|| {
            Error::new(ErrorDetails::MissingSecret {
                name: name.to_string(),
            })
        })
    }
}

/// Reads secrets from environment variables.
///
/// `GATEWAY_SECRET_<Name>` takes precedence over a bare `<Name>` variable.
#[derive(Debug, Default, Clone)]
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_optional(&self, name: &str) -> Result<Option<SecretString>, Error> {
        let value = std::env::var(format!("{ENV_SECRET_PREFIX}{name}"))
            .or_else(|_| std::env::var(name))
            .ok()
            .filter(|v| !v.is_empty());
        Ok(value.map(SecretString::from))
    }
}

/// An in-memory secret store.
#[derive(Debug, Default, Clone)]
pub struct StaticSecretStore {
    secrets: HashMap<String, SecretString>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.secrets
            .insert(name.to_string(), SecretString::from(value.to_string()));
        self
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn get_optional(&self, name: &str) -> Result<Option<SecretString>, Error> {
        Ok(self.secrets.get(name).cloned())
    }
}
