//! The gateway's TOML configuration.
//!
//! Every section is optional, so an empty file (or no file at all) yields a gateway
//! that listens on `0.0.0.0:3002` with the embedded catalog.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::db::postgres::POSTGRES_URL_ENV;
use crate::error::{Error, ErrorDetails};

pub mod gateway;

pub use gateway::GatewayConfig;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresConfig {
    pub url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to read config file `{}`: {e}", path.display()),
            })
        })?;
        Self::load_from_str(&contents).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to parse config file `{}`: {e}", path.display()),
            })
        })
    }

    pub fn load_from_str(contents: &str) -> Result<Self, Error> {
        toml::from_str(contents).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: e.to_string(),
            })
        })
    }

    /// The Postgres URL, with `GATEWAY_POSTGRES_URL` taking precedence over `[postgres] url`.
    pub fn postgres_url(&self) -> Option<String> {
        std::env::var(POSTGRES_URL_ENV)
            .ok()
            .or_else(|| self.postgres.url.clone())
    }

    pub fn load_catalog(&self) -> Result<Catalog, Error> {
        match &self.gateway.catalog_path {
            Some(path) => Catalog::from_path(path),
            None => Catalog::embedded(),
        }
    }
}
