use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3002))
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
    /// Set when running in a container that exposes ECS task credentials.
    /// Vertex then exchanges those credentials instead of the ambient AWS ones.
    #[serde(default)]
    pub is_remote: bool,
    /// Replaces the model catalog compiled into the gateway.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            is_remote: false,
            catalog_path: None,
        }
    }
}
