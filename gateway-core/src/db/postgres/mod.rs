use sqlx::{PgPool, migrate, postgres::PgPoolOptions};

use crate::error::{Error, ErrorDetails};

pub mod branch_queries;
pub mod provider_config_queries;

pub const POSTGRES_URL_ENV: &str = "GATEWAY_POSTGRES_URL";

#[derive(Debug, Clone)]
pub enum PostgresConnectionInfo {
    Enabled { pool: PgPool },
    Disabled,
}

impl PostgresConnectionInfo {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self::Enabled { pool }
    }

    pub fn new_disabled() -> Self {
        Self::Disabled
    }

    /// Connects lazily, so the gateway can start before the database is reachable.
    pub fn connect_lazy(postgres_url: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .connect_lazy(postgres_url)
            .map_err(|err| {
                Error::new(ErrorDetails::PostgresConnectionInitialization {
                    message: err.to_string(),
                })
            })?;
        Ok(Self::new_with_pool(pool))
    }

    pub fn get_pool_result(&self) -> Result<&PgPool, Error> {
        match self {
            Self::Enabled { pool } => Ok(pool),
            Self::Disabled => Err(Error::new(ErrorDetails::Config {
                message: "Postgres is not configured".to_string(),
            })),
        }
    }
}

pub async fn manual_run_postgres_migrations(postgres_url: Option<&str>) -> Result<(), Error> {
    let postgres_url = match postgres_url {
        Some(url) => url.to_string(),
        None => std::env::var(POSTGRES_URL_ENV).map_err(|_| {
            Error::new(ErrorDetails::PostgresConnectionInitialization {
                message: format!("Failed to read {POSTGRES_URL_ENV} environment variable"),
            })
        })?,
    };
    let pool = PgPoolOptions::new()
        .connect(&postgres_url)
        .await
        .map_err(|err| {
            Error::new(ErrorDetails::PostgresConnectionInitialization {
                message: err.to_string(),
            })
        })?;
    migrate!("src/db/postgres/migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            Error::new(ErrorDetails::PostgresMigration {
                message: e.to_string(),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BranchQueries, ProviderConfigQueries};
    use crate::providers::ProviderName;

    #[tokio::test]
    async fn test_disabled_connection_reports_config_error() {
        let connection = PostgresConnectionInfo::new_disabled();
        let err = connection
            .get_branch_models("acme", "main")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Postgres is not configured");
        let err = connection
            .get_unredacted_provider_config(ProviderName::Bedrock)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Postgres is not configured");
    }
}
