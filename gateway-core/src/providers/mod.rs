//! Upstream LLM vendors and the uniform contract the gateway uses to reach them.
//!
//! Every vendor exposes three operations:
//! - `get_default_config`: derive a config from the secret store
//! - `create`: build a client handle from a config
//! - `transform_model_id`: map the catalog id onto the id the vendor expects
//!
//! `ProviderName` is the registry key; dispatch is a `match` over it, so vendor
//! specifics stay in the vendor modules.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Value, json};
use url::Url;

use crate::error::{BadRequestCode, Error, ErrorDetails};
use crate::inference::types::{EmbeddingResult, GenerateRequest, GenerateResult, GenerationStream};
use crate::secrets::SecretStore;

pub mod aws_bedrock;
pub mod aws_common;
pub mod cache;
pub mod chat_completions;
pub mod cohere;
pub mod gcp_credentials;
pub mod gcp_vertex_gemini;
pub mod groq;
pub mod helpers;
pub mod resolver;
pub mod voyage;

use aws_bedrock::AWSBedrockProvider;
use cohere::CohereProvider;
use gcp_vertex_gemini::GCPVertexGeminiProvider;
use groq::GroqProvider;
use voyage::VoyageProvider;

/// Placeholder written over secret fields in redacted configs.
pub const REDACTED: &str = "***";

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderName {
    Bedrock,
    Vertex,
    Groq,
    Cohere,
    Voyage,
}

impl ProviderName {
    /// Parses a provider name coming from a caller or a stored record.
    pub fn parse(name: &str) -> Result<Self, Error> {
        ProviderName::from_str(name).map_err(|_| {
            Error::new(ErrorDetails::BadRequest {
                message: format!("Unknown or unsupported provider '{name}'"),
                code: BadRequestCode::ProviderUnsupported,
            })
        })
    }

    /// Builds this provider's configuration from the platform's own secrets.
    pub async fn get_default_config(self, ctx: &ProviderContext) -> Result<ProviderConfig, Error> {
        let secrets = ctx.secrets.as_ref();
        Ok(match self {
            ProviderName::Bedrock => {
                ProviderConfig::Bedrock(aws_bedrock::get_default_config(secrets).await?)
            }
            ProviderName::Vertex => {
                ProviderConfig::Vertex(gcp_vertex_gemini::get_default_config(secrets).await?)
            }
            ProviderName::Groq => ProviderConfig::Groq(
                ApiKeyProviderConfig::from_secrets(secrets, "GroqApiKey", "GroqBaseUrl").await?,
            ),
            ProviderName::Cohere => ProviderConfig::Cohere(
                ApiKeyProviderConfig::from_secrets(secrets, "CohereApiKey", "CohereBaseUrl")
                    .await?,
            ),
            ProviderName::Voyage => ProviderConfig::Voyage(
                ApiKeyProviderConfig::from_secrets(secrets, "VoyageApiKey", "VoyageBaseUrl")
                    .await?,
            ),
        })
    }
}

/// Shared dependencies handed to every adapter.
#[derive(Clone)]
pub struct ProviderContext {
    pub secrets: Arc<dyn SecretStore>,
    pub http_client: reqwest::Client,
    /// Whether the gateway runs inside a container that exposes ECS task credentials.
    pub is_remote: bool,
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("is_remote", &self.is_remote)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AwsProviderConfig {
    pub bedrock_role_arn: String,
    pub region: String,
    #[serde(default, rename = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<Url>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GoogleProviderConfig {
    pub service_account_email: String,
    pub audience: String,
    pub location: String,
    pub project: String,
    #[serde(default, rename = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<Url>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApiKeyProviderConfig {
    #[serde(serialize_with = "serialize_secret")]
    pub api_key: SecretString,
    #[serde(default, rename = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<Url>,
}

fn serialize_secret<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl fmt::Debug for ApiKeyProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyProviderConfig")
            .field("api_key", &REDACTED)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ApiKeyProviderConfig {
    async fn from_secrets(
        secrets: &dyn SecretStore,
        api_key_name: &str,
        base_url_name: &str,
    ) -> Result<Self, Error> {
        let api_key = secrets.get(api_key_name).await?;
        let base_url = optional_url_secret(secrets, base_url_name).await?;
        Ok(Self { api_key, base_url })
    }
}

/// Reads an optional secret holding a URL, such as a `<Vendor>BaseUrl` override.
pub async fn optional_url_secret(
    secrets: &dyn SecretStore,
    name: &str,
) -> Result<Option<Url>, Error> {
    secrets
        .get_optional(name)
        .await?
        .map(|raw| {
            Url::parse(raw.expose_secret()).map_err(|e| {
                Error::new(ErrorDetails::Config {
                    message: format!("Secret `{name}` is not a valid URL: {e}"),
                })
            })
        })
        .transpose()
}

/// A provider name together with the credentials and settings to reach it.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "name", content = "config", rename_all = "lowercase")]
pub enum ProviderConfig {
    Bedrock(AwsProviderConfig),
    Vertex(GoogleProviderConfig),
    Groq(ApiKeyProviderConfig),
    Cohere(ApiKeyProviderConfig),
    Voyage(ApiKeyProviderConfig),
}

impl ProviderConfig {
    /// Builds a config from a provider name and its stored JSON settings.
    pub fn from_stored(name: ProviderName, config: Value) -> Result<Self, Error> {
        let invalid = |e: serde_json::Error| {
            Error::new(ErrorDetails::InvalidProviderConfig {
                provider: name,
                message: e.to_string(),
            })
        };
        Ok(match name {
            ProviderName::Bedrock => {
                ProviderConfig::Bedrock(serde_json::from_value(config).map_err(invalid)?)
            }
            ProviderName::Vertex => {
                ProviderConfig::Vertex(serde_json::from_value(config).map_err(invalid)?)
            }
            ProviderName::Groq => ProviderConfig::Groq(serde_json::from_value(config).map_err(invalid)?),
            ProviderName::Cohere => {
                ProviderConfig::Cohere(serde_json::from_value(config).map_err(invalid)?)
            }
            ProviderName::Voyage => {
                ProviderConfig::Voyage(serde_json::from_value(config).map_err(invalid)?)
            }
        })
    }

    pub fn name(&self) -> ProviderName {
        match self {
            ProviderConfig::Bedrock(_) => ProviderName::Bedrock,
            ProviderConfig::Vertex(_) => ProviderName::Vertex,
            ProviderConfig::Groq(_) => ProviderName::Groq,
            ProviderConfig::Cohere(_) => ProviderName::Cohere,
            ProviderConfig::Voyage(_) => ProviderName::Voyage,
        }
    }

    /// The config as JSON with a stable field order. Secrets are included.
    pub fn canonical_config_json(&self) -> Result<String, Error> {
        let config = match self {
            ProviderConfig::Bedrock(config) => serde_json::to_string(config),
            ProviderConfig::Vertex(config) => serde_json::to_string(config),
            ProviderConfig::Groq(config)
            | ProviderConfig::Cohere(config)
            | ProviderConfig::Voyage(config) => serde_json::to_string(config),
        };
        config.map_err(|e| {
            Error::new(ErrorDetails::Serialization {
                message: format!("Failed to serialize `{}` provider config: {e}", self.name()),
            })
        })
    }

    /// The `{name, config}` view with every secret field masked.
    pub fn redacted(&self) -> Value {
        let config = match self {
            ProviderConfig::Bedrock(config) => json!(config),
            ProviderConfig::Vertex(config) => json!(config),
            ProviderConfig::Groq(config)
            | ProviderConfig::Cohere(config)
            | ProviderConfig::Voyage(config) => {
                let mut value = json!({ "apiKey": REDACTED });
                if let Some(base_url) = &config.base_url {
                    value["baseURL"] = json!(base_url);
                }
                value
            }
        };
        json!({ "name": self.name(), "config": config })
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProviderConfig({})", self.redacted())
    }
}

/// Builds a client handle for `config`.
pub async fn create_provider(
    config: &ProviderConfig,
    ctx: &ProviderContext,
) -> Result<ProviderClient, Error> {
    Ok(match config {
        ProviderConfig::Bedrock(config) => {
            ProviderClient::Bedrock(AWSBedrockProvider::new(config, ctx).await?)
        }
        ProviderConfig::Vertex(config) => {
            ProviderClient::Vertex(GCPVertexGeminiProvider::new(config, ctx)?)
        }
        ProviderConfig::Groq(config) => ProviderClient::Groq(GroqProvider::new(config, ctx)),
        ProviderConfig::Cohere(config) => ProviderClient::Cohere(CohereProvider::new(config, ctx)),
        ProviderConfig::Voyage(config) => ProviderClient::Voyage(VoyageProvider::new(config, ctx)),
    })
}

/// Maps a catalog model id onto the id the vendor expects.
pub async fn transform_model_id(
    config: &ProviderConfig,
    model_id: &str,
    ctx: &ProviderContext,
) -> Result<String, Error> {
    match config {
        ProviderConfig::Bedrock(config) => aws_bedrock::transform_model_id(model_id, config, ctx).await,
        ProviderConfig::Vertex(_)
        | ProviderConfig::Groq(_)
        | ProviderConfig::Cohere(_)
        | ProviderConfig::Voyage(_) => Ok(model_id.to_string()),
    }
}

/// A constructed vendor client. Handles are shared through the provider cache.
#[derive(Debug)]
pub enum ProviderClient {
    Bedrock(AWSBedrockProvider),
    Vertex(GCPVertexGeminiProvider),
    Groq(GroqProvider),
    Cohere(CohereProvider),
    Voyage(VoyageProvider),
}

impl ProviderClient {
    pub fn name(&self) -> ProviderName {
        match self {
            ProviderClient::Bedrock(_) => ProviderName::Bedrock,
            ProviderClient::Vertex(_) => ProviderName::Vertex,
            ProviderClient::Groq(_) => ProviderName::Groq,
            ProviderClient::Cohere(_) => ProviderName::Cohere,
            ProviderClient::Voyage(_) => ProviderName::Voyage,
        }
    }

    pub async fn generate(
        &self,
        model_id: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResult, Error> {
        match self {
            ProviderClient::Bedrock(provider) => provider.generate(model_id, request).await,
            ProviderClient::Vertex(provider) => provider.generate(model_id, request).await,
            ProviderClient::Groq(provider) => provider.generate(model_id, request).await,
            ProviderClient::Cohere(provider) => provider.generate(model_id, request).await,
            ProviderClient::Voyage(_) => Err(self.unsupported("chat")),
        }
    }

    pub async fn stream(
        &self,
        model_id: &str,
        request: &GenerateRequest,
    ) -> Result<GenerationStream, Error> {
        match self {
            ProviderClient::Bedrock(provider) => provider.stream(model_id, request).await,
            ProviderClient::Vertex(provider) => provider.stream(model_id, request).await,
            ProviderClient::Groq(provider) => provider.stream(model_id, request).await,
            ProviderClient::Cohere(provider) => provider.stream(model_id, request).await,
            ProviderClient::Voyage(_) => Err(self.unsupported("chat")),
        }
    }

    pub async fn embed(&self, model_id: &str, inputs: &[String]) -> Result<EmbeddingResult, Error> {
        match self {
            ProviderClient::Bedrock(provider) => provider.embed(model_id, inputs).await,
            ProviderClient::Cohere(provider) => provider.embed(model_id, inputs).await,
            ProviderClient::Voyage(provider) => provider.embed(model_id, inputs).await,
            ProviderClient::Vertex(_) | ProviderClient::Groq(_) => Err(self.unsupported("embedding")),
        }
    }

    fn unsupported(&self, modality: &str) -> Error {
        Error::new(ErrorDetails::BadRequest {
            message: format!("Provider '{}' does not support {modality} models", self.name()),
            code: BadRequestCode::ModelUnsupported,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_name() {
        assert_eq!(ProviderName::parse("bedrock").unwrap(), ProviderName::Bedrock);
        let err = ProviderName::parse("openrouter").unwrap_err();
        assert!(matches!(
            err.get_details(),
            ErrorDetails::BadRequest {
                code: BadRequestCode::ProviderUnsupported,
                ..
            }
        ));
    }

    #[test]
    fn test_stored_config_round_trip() {
        let config = ProviderConfig::from_stored(
            ProviderName::Groq,
            json!({"apiKey": "gsk-secret", "baseURL": "https://proxy.example.com/openai/v1"}),
        )
        .unwrap();
        assert_eq!(config.name(), ProviderName::Groq);
        assert_eq!(
            config.canonical_config_json().unwrap(),
            r#"{"apiKey":"gsk-secret","baseURL":"https://proxy.example.com/openai/v1"}"#
        );
    }

    #[test]
    fn test_stored_config_shape_mismatch() {
        let err = ProviderConfig::from_stored(ProviderName::Bedrock, json!({"apiKey": "x"}))
            .unwrap_err();
        assert!(matches!(
            err.get_details(),
            ErrorDetails::InvalidProviderConfig {
                provider: ProviderName::Bedrock,
                ..
            }
        ));
    }

    #[test]
    fn test_redaction_masks_api_key() {
        let config = ProviderConfig::from_stored(ProviderName::Cohere, json!({"apiKey": "co-secret"}))
            .unwrap();
        assert_eq!(
            config.redacted(),
            json!({"name": "cohere", "config": {"apiKey": "***"}})
        );
        let debug = format!("{config:?}");
        assert!(!debug.contains("co-secret"), "Secret leaked: {debug}");
    }

    #[test]
    fn test_redaction_keeps_non_secret_fields() {
        let config = ProviderConfig::Bedrock(AwsProviderConfig {
            bedrock_role_arn: "arn:aws:iam::123456789012:role/bedrock".to_string(),
            region: "us-east-1".to_string(),
            base_url: None,
        });
        assert_eq!(
            config.redacted(),
            json!({
                "name": "bedrock",
                "config": {
                    "bedrockRoleArn": "arn:aws:iam::123456789012:role/bedrock",
                    "region": "us-east-1",
                }
            })
        );
    }

    #[test]
    fn test_adjacently_tagged_serialization() {
        let config: ProviderConfig = serde_json::from_value(json!({
            "name": "vertex",
            "config": {
                "serviceAccountEmail": "sa@proj.iam.gserviceaccount.com",
                "audience": "//iam.googleapis.com/projects/1/locations/global/workloadIdentityPools/p/providers/aws",
                "location": "us-central1",
                "project": "proj",
            }
        }))
        .unwrap();
        assert_eq!(config.name(), ProviderName::Vertex);
    }
}
