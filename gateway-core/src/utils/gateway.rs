//! State shared by every request handler.

use std::sync::Arc;

use axum::extract::State;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::db::postgres::PostgresConnectionInfo;
use crate::db::{BranchQueries, ProviderConfigQueries};
use crate::error::{Error, ErrorDetails};
use crate::providers::ProviderContext;
use crate::providers::cache::ProviderCache;
use crate::providers::resolver::ModelResolver;
use crate::secrets::SecretStore;

/// Cloned into every handler; everything inside is behind an `Arc` or cheap to clone.
#[derive(Clone)]
pub struct AppStateData {
    pub catalog: Arc<Catalog>,
    pub provider_cache: Arc<ProviderCache>,
    pub provider_context: ProviderContext,
    pub branches: Arc<dyn BranchQueries>,
    pub provider_configs: Arc<dyn ProviderConfigQueries>,
}

pub type AppState = State<AppStateData>;

impl AppStateData {
    pub fn new(
        catalog: Arc<Catalog>,
        provider_context: ProviderContext,
        branches: Arc<dyn BranchQueries>,
        provider_configs: Arc<dyn ProviderConfigQueries>,
    ) -> Self {
        Self {
            catalog,
            provider_cache: Arc::new(ProviderCache::new()),
            provider_context,
            branches,
            provider_configs,
        }
    }

    /// Builds the state for the standalone gateway: Postgres backs both stores.
    pub fn from_config(
        config: &Config,
        postgres_connection_info: PostgresConnectionInfo,
        secrets: Arc<dyn SecretStore>,
    ) -> Result<Self, Error> {
        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to build HTTP client: {e}"),
            })
        })?;
        let postgres = Arc::new(postgres_connection_info);
        Ok(Self::new(
            Arc::new(config.load_catalog()?),
            ProviderContext {
                secrets,
                http_client,
                is_remote: config.gateway.is_remote,
            },
            postgres.clone(),
            postgres,
        ))
    }

    pub fn model_resolver(&self) -> ModelResolver<'_> {
        ModelResolver {
            catalog: &self.catalog,
            branches: self.branches.as_ref(),
            provider_configs: self.provider_configs.as_ref(),
            provider_cache: &self.provider_cache,
            ctx: &self.provider_context,
        }
    }
}

impl std::fmt::Debug for AppStateData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppStateData")
            .field("provider_cache", &self.provider_cache)
            .field("provider_context", &self.provider_context)
            .finish_non_exhaustive()
    }
}
