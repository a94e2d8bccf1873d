use axum::debug_handler;
use axum::response::Json;
use serde::{Deserialize, Serialize};

pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A handler for `GET /`
#[debug_handler]
pub async fn root_handler() -> &'static str {
    "Gateway says hello!"
}

/// A handler for a simple liveness check
#[debug_handler]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        gateway: "ok".to_string(),
    })
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HealthResponse {
    pub gateway: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(
            serde_json::to_value(&response.0).unwrap(),
            serde_json::json!({"gateway": "ok"})
        );
    }

    #[tokio::test]
    async fn test_root_handler() {
        assert!(root_handler().await.contains("hello"));
    }
}
