//! Turns a stored model into a ready-to-call provider client.
//!
//! The steps run in a fixed order: branch lookup, catalog and modality check,
//! provider config, provider model id, cached client, vendor model id. Everything
//! up to the provider config is validated before any adapter is constructed.

use std::sync::Arc;

use crate::catalog::{Catalog, Modality, SupportedModelDefinition};
use crate::db::{BranchQueries, ProviderConfigQueries};
use crate::error::{BadRequestCode, Error, ErrorDetails};
use crate::model_config::{ModelConfig, get_model_config};
use crate::providers::cache::ProviderCache;
use crate::providers::{
    ProviderClient, ProviderConfig, ProviderContext, ProviderName, transform_model_id,
};

/// Picks the provider config for a model.
///
/// With custom routing the tenant's stored config is required; there is no fallback
/// to the platform defaults. Otherwise the first provider the catalog lists for the
/// model is used with its default config.
pub async fn get_provider_config(
    model_config: &ModelConfig,
    definition: &SupportedModelDefinition,
    provider_configs: &dyn ProviderConfigQueries,
    ctx: &ProviderContext,
) -> Result<ProviderConfig, Error> {
    if let Some(custom_routing) = &model_config.custom_routing {
        let name = ProviderName::parse(custom_routing)?;
        return provider_configs
            .get_unredacted_provider_config(name)
            .await?
            .ok_or_else(|| {
                Error::new(ErrorDetails::BadRequest {
                    message: format!("Provider '{name}' is not configured"),
                    code: BadRequestCode::ProviderUnsupported,
                })
            });
    }
    let name = definition.default_provider().ok_or_else(|| {
        Error::new(ErrorDetails::Catalog {
            message: format!("Model `{}` has no providers", definition.model_type),
        })
    })?;
    name.get_default_config(ctx).await
}

/// A provider client ready to serve one request.
#[derive(Debug)]
pub struct ResolvedModel {
    pub model_config: ModelConfig,
    pub definition: SupportedModelDefinition,
    pub provider: Arc<ProviderClient>,
    /// The model id in the form the vendor expects.
    pub model_id: String,
}

/// Everything needed to resolve a model path, borrowed from the gateway state.
#[derive(Clone, Copy)]
pub struct ModelResolver<'a> {
    pub catalog: &'a Catalog,
    pub branches: &'a dyn BranchQueries,
    pub provider_configs: &'a dyn ProviderConfigQueries,
    pub provider_cache: &'a ProviderCache,
    pub ctx: &'a ProviderContext,
}

impl ModelResolver<'_> {
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, path: &str, modality: Modality) -> Result<ResolvedModel, Error> {
        let model_config = get_model_config(self.branches, path).await?;
        let definition = self
            .catalog
            .get_supported_model_or_throw(&model_config.model_type, modality)?
            .clone();
        let provider_config =
            get_provider_config(&model_config, &definition, self.provider_configs, self.ctx)
                .await?;
        let provider_model_id = definition.provider_model_id(provider_config.name())?;
        let provider = self
            .provider_cache
            .get_or_create(&provider_config, self.ctx)
            .await?;
        let model_id = transform_model_id(&provider_config, provider_model_id, self.ctx).await?;
        tracing::debug!(
            provider = %provider_config.name(),
            %model_id,
            "Resolved model `{path}`"
        );
        Ok(ResolvedModel {
            model_config,
            definition,
            provider,
            model_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::{MockBranchQueries, MockProviderConfigQueries};
    use crate::providers::ApiKeyProviderConfig;
    use crate::secrets::StaticSecretStore;

    fn ctx(secrets: StaticSecretStore) -> ProviderContext {
        ProviderContext {
            secrets: Arc::new(secrets),
            http_client: reqwest::Client::new(),
            is_remote: false,
        }
    }

    fn model(alias: &str, model_type: &str, custom_routing: Option<&str>) -> ModelConfig {
        ModelConfig {
            alias: alias.to_string(),
            model_type: model_type.to_string(),
            custom_routing: custom_routing.map(str::to_string),
        }
    }

    fn branches(models: Vec<ModelConfig>) -> MockBranchQueries {
        let mut branches = MockBranchQueries::new();
        branches.expect_get_branch_models().returning(move |_, _| {
            let models = models.clone();
            Box::pin(async move { Ok(Some(models)) })
        });
        branches
    }

    #[tokio::test]
    async fn test_default_routing_uses_first_catalog_provider() {
        let catalog = Catalog::embedded().unwrap();
        let definition = catalog.get("openai/gpt-oss-120b").unwrap();
        // No expectations: a custom-routing lookup would panic.
        let provider_configs = MockProviderConfigQueries::new();
        let ctx = ctx(StaticSecretStore::new().with("GroqApiKey", "gsk-default"));
        let config = get_provider_config(
            &model("default", "openai/gpt-oss-120b", None),
            definition,
            &provider_configs,
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(config.name(), ProviderName::Groq);
    }

    #[tokio::test]
    async fn test_custom_routing_uses_stored_config() {
        let catalog = Catalog::embedded().unwrap();
        let definition = catalog.get("cohere/embed-v4.0").unwrap();
        let mut provider_configs = MockProviderConfigQueries::new();
        provider_configs
            .expect_get_unredacted_provider_config()
            .withf(|name| *name == ProviderName::Cohere)
            .times(1)
            .returning(|_| {
                Box::pin(async move {
                    Ok(Some(ProviderConfig::from_stored(
                        ProviderName::Cohere,
                        json!({"apiKey": "co-tenant"}),
                    )?))
                })
            });
        let config = get_provider_config(
            &model("embed", "cohere/embed-v4.0", Some("cohere")),
            definition,
            &provider_configs,
            &ctx(StaticSecretStore::new()),
        )
        .await
        .unwrap();
        assert!(matches!(
            config,
            ProviderConfig::Cohere(ApiKeyProviderConfig { base_url: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_custom_routing_without_stored_config_is_rejected() {
        let catalog = Catalog::embedded().unwrap();
        let definition = catalog.get("openai/gpt-oss-120b").unwrap();
        let mut provider_configs = MockProviderConfigQueries::new();
        provider_configs
            .expect_get_unredacted_provider_config()
            .returning(|_| Box::pin(async move { Ok(None) }));
        // The Bedrock defaults are available, but must not be used.
        let ctx = ctx(
            StaticSecretStore::new()
                .with("BedrockRoleArn", "arn:aws:iam::123456789012:role/bedrock")
                .with("BedrockRegion", "us-east-1"),
        );
        let err = get_provider_config(
            &model("byo", "openai/gpt-oss-120b", Some("bedrock")),
            definition,
            &provider_configs,
            &ctx,
        )
        .await
        .unwrap_err();
        assert_eq!(
            *err.get_details(),
            ErrorDetails::BadRequest {
                message: "Provider 'bedrock' is not configured".to_string(),
                code: BadRequestCode::ProviderUnsupported,
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_custom_routing_provider() {
        let catalog = Catalog::embedded().unwrap();
        let definition = catalog.get("openai/gpt-oss-120b").unwrap();
        let provider_configs = MockProviderConfigQueries::new();
        let err = get_provider_config(
            &model("byo", "openai/gpt-oss-120b", Some("openrouter")),
            definition,
            &provider_configs,
            &ctx(StaticSecretStore::new()),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.get_details(),
            ErrorDetails::BadRequest {
                code: BadRequestCode::ProviderUnsupported,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_default_secret_surfaces() {
        let catalog = Catalog::embedded().unwrap();
        let definition = catalog.get("voyage/voyage-3.5").unwrap();
        let provider_configs = MockProviderConfigQueries::new();
        let err = get_provider_config(
            &model("embed", "voyage/voyage-3.5", None),
            definition,
            &provider_configs,
            &ctx(StaticSecretStore::new()),
        )
        .await
        .unwrap_err();
        assert_eq!(
            *err.get_details(),
            ErrorDetails::MissingSecret {
                name: "VoyageApiKey".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_default_chat_model() {
        let catalog = Catalog::embedded().unwrap();
        let branches = branches(vec![model("default", "openai/gpt-oss-120b", None)]);
        let provider_configs = MockProviderConfigQueries::new();
        let provider_cache = ProviderCache::new();
        let ctx = ctx(StaticSecretStore::new().with("GroqApiKey", "gsk-default"));
        let resolver = ModelResolver {
            catalog: &catalog,
            branches: &branches,
            provider_configs: &provider_configs,
            provider_cache: &provider_cache,
            ctx: &ctx,
        };
        let resolved = resolver
            .resolve("acme/main/default", Modality::Chat)
            .await
            .unwrap();
        assert_eq!(resolved.provider.name(), ProviderName::Groq);
        assert_eq!(resolved.model_id, "openai/gpt-oss-120b");
        assert_eq!(provider_cache.len(), 1);

        let again = resolver
            .resolve("acme/main/default", Modality::Chat)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&resolved.provider, &again.provider));
    }

    #[tokio::test]
    async fn test_modality_mismatch_never_builds_a_provider() {
        let catalog = Catalog::embedded().unwrap();
        let branches = branches(vec![model("embed", "cohere/embed-v4.0", None)]);
        let provider_configs = MockProviderConfigQueries::new();
        let provider_cache = ProviderCache::new();
        let ctx = ctx(StaticSecretStore::new().with("CohereApiKey", "co-default"));
        let resolver = ModelResolver {
            catalog: &catalog,
            branches: &branches,
            provider_configs: &provider_configs,
            provider_cache: &provider_cache,
            ctx: &ctx,
        };
        let err = resolver
            .resolve("acme/main/embed", Modality::Chat)
            .await
            .unwrap_err();
        assert!(matches!(
            err.get_details(),
            ErrorDetails::BadRequest {
                code: BadRequestCode::ModelMismatch,
                ..
            }
        ));
        assert!(provider_cache.is_empty());
    }

    #[tokio::test]
    async fn test_custom_routing_to_unlisted_provider() {
        let catalog = Catalog::embedded().unwrap();
        let branches = branches(vec![model("fast", "voyage/voyage-3.5", Some("groq"))]);
        let mut provider_configs = MockProviderConfigQueries::new();
        provider_configs
            .expect_get_unredacted_provider_config()
            .returning(|_| {
                Box::pin(async move {
                    Ok(Some(ProviderConfig::from_stored(
                        ProviderName::Groq,
                        json!({"apiKey": "gsk-tenant"}),
                    )?))
                })
            });
        let provider_cache = ProviderCache::new();
        let ctx = ctx(StaticSecretStore::new());
        let resolver = ModelResolver {
            catalog: &catalog,
            branches: &branches,
            provider_configs: &provider_configs,
            provider_cache: &provider_cache,
            ctx: &ctx,
        };
        let err = resolver
            .resolve("acme/main/fast", Modality::Embedding)
            .await
            .unwrap_err();
        assert!(matches!(
            err.get_details(),
            ErrorDetails::BadRequest {
                code: BadRequestCode::ModelUnsupported,
                ..
            }
        ));
        assert!(provider_cache.is_empty());
    }
}
