//! Process-wide memoization of constructed provider clients.
//!
//! Clients are keyed by provider name plus the canonical JSON of their config, so two
//! requests with byte-identical configs share one client. Entries never expire: rotated
//! default credentials are only picked up after a restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use metrics::counter;

use crate::error::{Error, ErrorDetails};
use crate::observability::PROVIDER_INSTANCES_CREATED_TOTAL;
use crate::providers::{ProviderClient, ProviderConfig, ProviderContext, create_provider};

#[derive(Debug, Default)]
pub struct ProviderCache {
    providers: Mutex<HashMap<String, Arc<ProviderClient>>>,
}

impl ProviderCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cache_key(config: &ProviderConfig) -> Result<String, Error> {
        // Keys hold a digest of the config, never the credentials themselves.
        let canonical = config.canonical_config_json()?;
        Ok(format!(
            "{}:{}",
            config.name(),
            blake3::hash(canonical.as_bytes()).to_hex()
        ))
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<ProviderClient>>>, Error> {
        self.providers.lock().map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Provider cache lock is poisoned: {e}"),
            })
        })
    }

    /// Returns the cached client for `config`, constructing it on a miss.
    ///
    /// The lock is not held while constructing, since Bedrock construction performs
    /// an STS round trip. If two requests race on the same key, both construct a client
    /// and the first one inserted is kept and returned to both.
    pub async fn get_or_create(
        &self,
        config: &ProviderConfig,
        ctx: &ProviderContext,
    ) -> Result<Arc<ProviderClient>, Error> {
        let key = Self::cache_key(config)?;
        let cached = self.lock()?.get(&key).cloned();
        if let Some(provider) = cached {
            tracing::debug!(provider = %config.name(), "Provider cache hit");
            return Ok(provider);
        }
        tracing::debug!(provider = %config.name(), "Provider cache miss");
        let provider = Arc::new(create_provider(config, ctx).await?);
        counter!(
            PROVIDER_INSTANCES_CREATED_TOTAL,
            "provider" => config.name().to_string()
        )
        .increment(1);
        Ok(self.lock()?.entry(key).or_insert(provider).clone())
    }

    pub fn len(&self) -> usize {
        self.providers.lock().map(|providers| providers.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
