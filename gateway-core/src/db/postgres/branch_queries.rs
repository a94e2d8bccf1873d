use async_trait::async_trait;
use sqlx::types::Json;

use crate::db::BranchQueries;
use crate::db::postgres::PostgresConnectionInfo;
use crate::error::Error;
use crate::model_config::ModelConfig;

#[async_trait]
impl BranchQueries for PostgresConnectionInfo {
    async fn get_branch_models(
        &self,
        agent_slug: &str,
        branch_slug: &str,
    ) -> Result<Option<Vec<ModelConfig>>, Error> {
        let pool = self.get_pool_result()?;

        let models: Option<Json<Vec<ModelConfig>>> = sqlx::query_scalar(
            r"SELECT models
               FROM branches
               WHERE agent_slug = $1 AND slug = $2
               LIMIT 1",
        )
        .bind(agent_slug)
        .bind(branch_slug)
        .fetch_optional(pool)
        .await?;

        Ok(models.map(|Json(models)| models))
    }
}
