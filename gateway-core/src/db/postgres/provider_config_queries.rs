use async_trait::async_trait;

use crate::db::ProviderConfigQueries;
use crate::db::postgres::PostgresConnectionInfo;
use crate::error::Error;
use crate::providers::{ProviderConfig, ProviderName};

#[async_trait]
impl ProviderConfigQueries for PostgresConnectionInfo {
    async fn get_unredacted_provider_config(
        &self,
        name: ProviderName,
    ) -> Result<Option<ProviderConfig>, Error> {
        let pool = self.get_pool_result()?;

        let config: Option<serde_json::Value> = sqlx::query_scalar(
            r"SELECT config
               FROM providers
               WHERE name = $1
               LIMIT 1",
        )
        .bind(name.to_string())
        .fetch_optional(pool)
        .await?;

        config
            .map(|config| ProviderConfig::from_stored(name, config))
            .transpose()
    }
}
