//! Read-only access to the tables the gateway shares with the CRUD layer.
//!
//! Writes to branches and providers are owned elsewhere; the gateway only ever
//! performs keyed reads.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::error::Error;
use crate::model_config::ModelConfig;
use crate::providers::{ProviderConfig, ProviderName};

pub mod postgres;

#[async_trait]
#[cfg_attr(test, automock)]
pub trait BranchQueries: Send + Sync {
    /// Returns the models stored on a branch, or `None` if no such branch exists.
    async fn get_branch_models(
        &self,
        agent_slug: &str,
        branch_slug: &str,
    ) -> Result<Option<Vec<ModelConfig>>, Error>;
}

#[async_trait]
#[cfg_attr(test, automock)]
pub trait ProviderConfigQueries: Send + Sync {
    /// Returns the decrypted, unredacted config the tenant stored for `name`.
    async fn get_unredacted_provider_config(
        &self,
        name: ProviderName,
    ) -> Result<Option<ProviderConfig>, Error>;
}
