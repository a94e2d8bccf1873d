//! Resolves `<agent>/<branch>/<alias>` paths to the model stored on a branch.

use serde::{Deserialize, Serialize};

use crate::db::BranchQueries;
use crate::error::{Error, ErrorDetails};

/// One usable model under a branch, as stored in the branch's `models` column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub alias: String,
    #[serde(rename = "type")]
    pub model_type: String,
    /// Name of a provider whose tenant-stored credentials serve this model.
    /// Kept as a raw string so unknown names are rejected at resolution time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_routing: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelPath<'a> {
    pub agent_slug: &'a str,
    pub branch_slug: &'a str,
    pub alias: &'a str,
}

impl<'a> ModelPath<'a> {
    /// Reads the first three `/`-separated segments. Anything after the alias is ignored.
    pub fn parse(path: &'a str) -> Result<Self, Error> {
        let invalid = || {
            Error::new(ErrorDetails::InvalidModelPath {
                path: path.to_string(),
            })
        };
        let mut segments = path.split('/');
        let (Some(agent_slug), Some(branch_slug), Some(alias)) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(invalid());
        };
        if agent_slug.is_empty() || branch_slug.is_empty() || alias.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            agent_slug,
            branch_slug,
            alias,
        })
    }
}

/// Looks up the model stored under `path` with a single read of its branch.
#[tracing::instrument(skip(branches))]
pub async fn get_model_config(
    branches: &dyn BranchQueries,
    path: &str,
) -> Result<ModelConfig, Error> {
    let ModelPath {
        agent_slug,
        branch_slug,
        alias,
    } = ModelPath::parse(path)?;
    let models = branches
        .get_branch_models(agent_slug, branch_slug)
        .await?
        .ok_or_else(|| {
            Error::new(ErrorDetails::BranchNotFound {
                agent_slug: agent_slug.to_string(),
                branch_slug: branch_slug.to_string(),
            })
        })?;
    models
        .into_iter()
        .find(|model| model.alias == alias)
        .ok_or_else(|| {
            Error::new(ErrorDetails::ModelNotFound {
                model: path.to_string(),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockBranchQueries;

    fn models() -> Vec<ModelConfig> {
        vec![
            ModelConfig {
                alias: "default".to_string(),
                model_type: "openai/gpt-oss-120b".to_string(),
                custom_routing: None,
            },
            ModelConfig {
                alias: "byo".to_string(),
                model_type: "openai/gpt-oss-20b".to_string(),
                custom_routing: Some("bedrock".to_string()),
            },
        ]
    }

    #[test]
    fn test_parse_model_path() {
        assert_eq!(
            ModelPath::parse("acme/main/default").unwrap(),
            ModelPath {
                agent_slug: "acme",
                branch_slug: "main",
                alias: "default",
            }
        );
        assert_eq!(
            ModelPath::parse("acme/main/default/extra").unwrap(),
            ModelPath {
                agent_slug: "acme",
                branch_slug: "main",
                alias: "default",
            }
        );
        for path in ["acme/main", "acme//default", "", "/main/x", "acme/main/"] {
            let err = ModelPath::parse(path).unwrap_err();
            assert!(
                matches!(err.get_details(), ErrorDetails::InvalidModelPath { .. }),
                "Unexpected error for `{path}`: {err:?}"
            );
        }
    }

    #[test]
    fn test_model_config_wire_shape() {
        let config: ModelConfig = serde_json::from_value(serde_json::json!({
            "alias": "byo",
            "type": "openai/gpt-oss-20b",
            "customRouting": "bedrock",
        }))
        .unwrap();
        assert_eq!(config, models()[1]);
    }

    #[tokio::test]
    async fn test_get_model_config() {
        let mut branches = MockBranchQueries::new();
        branches
            .expect_get_branch_models()
            .withf(|agent_slug, branch_slug| agent_slug == "acme" && branch_slug == "main")
            .times(1)
            .returning(|_, _| Box::pin(async move { Ok(Some(models())) }));
        let config = get_model_config(&branches, "acme/main/default").await.unwrap();
        assert_eq!(config.model_type, "openai/gpt-oss-120b");
        assert_eq!(config.custom_routing, None);
    }

    #[tokio::test]
    async fn test_missing_branch() {
        let mut branches = MockBranchQueries::new();
        branches
            .expect_get_branch_models()
            .returning(|_, _| Box::pin(async move { Ok(None) }));
        let err = get_model_config(&branches, "acme/dev/default")
            .await
            .unwrap_err();
        assert_eq!(
            *err.get_details(),
            ErrorDetails::BranchNotFound {
                agent_slug: "acme".to_string(),
                branch_slug: "dev".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_missing_alias() {
        let mut branches = MockBranchQueries::new();
        branches
            .expect_get_branch_models()
            .returning(|_, _| Box::pin(async move { Ok(Some(models())) }));
        let err = get_model_config(&branches, "acme/main/fast")
            .await
            .unwrap_err();
        assert_eq!(
            *err.get_details(),
            ErrorDetails::ModelNotFound {
                model: "acme/main/fast".to_string(),
            }
        );
        assert_eq!(err.to_string(), "Model 'acme/main/fast' not found");
    }

    #[tokio::test]
    async fn test_trailing_segments_are_ignored() {
        let mut branches = MockBranchQueries::new();
        branches
            .expect_get_branch_models()
            .withf(|agent_slug, branch_slug| agent_slug == "acme" && branch_slug == "main")
            .times(1)
            .returning(|_, _| Box::pin(async move { Ok(Some(models())) }));
        let config = get_model_config(&branches, "acme/main/byo/extra")
            .await
            .unwrap();
        assert_eq!(config.alias, "byo");
    }

    #[tokio::test]
    async fn test_invalid_path_skips_database() {
        // No expectations: any call would panic.
        let branches = MockBranchQueries::new();
        assert!(get_model_config(&branches, "default").await.is_err());
    }
}
