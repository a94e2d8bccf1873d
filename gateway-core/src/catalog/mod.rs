//! The static catalog of models the gateway can serve.
//!
//! The catalog is loaded once at startup and never mutated afterwards.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{BadRequestCode, Error, ErrorDetails};
use crate::providers::ProviderName;

const EMBEDDED_CATALOG: &str = include_str!("supported_models.json");

pub const DEFAULT_RATE_LIMIT: u64 = 400_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Modality {
    Chat,
    Embedding,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelFamily {
    Gpt,
    Gemini,
    Cohere,
    Voyage,
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupportedModelDefinition {
    #[serde(rename = "type")]
    pub model_type: String,
    pub display_name: String,
    pub family: ModelFamily,
    pub modality: Modality,
    /// Informational only; the gateway does not enforce it.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u64,
    /// Each entry maps provider names to the id that provider uses for this model.
    /// Order matters: the first key of the first entry is the default route.
    pub providers: Vec<IndexMap<ProviderName, String>>,
}

fn default_rate_limit() -> u64 {
    DEFAULT_RATE_LIMIT
}

impl SupportedModelDefinition {
    /// The provider used when the model has no custom routing.
    pub fn default_provider(&self) -> Option<ProviderName> {
        self.providers
            .first()
            .and_then(|entry| entry.keys().next().copied())
    }

    /// The provider-specific model id for `provider`.
    pub fn provider_model_id(&self, provider: ProviderName) -> Result<&str, Error> {
        self.providers
            .iter()
            .find_map(|entry| entry.get(&provider))
            .map(String::as_str)
            .ok_or_else(|| {
                Error::new(ErrorDetails::BadRequest {
                    message: format!(
                        "Missing provider {provider} for model {}",
                        self.model_type
                    ),
                    code: BadRequestCode::ModelUnsupported,
                })
            })
    }
}

#[derive(Clone, Debug)]
pub struct Catalog {
    models: IndexMap<String, SupportedModelDefinition>,
}

impl Catalog {
    /// The catalog compiled into the binary.
    pub fn embedded() -> Result<Self, Error> {
        Self::from_json(EMBEDDED_CATALOG)
    }

    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::new(ErrorDetails::Catalog {
                message: format!("Failed to read `{}`: {e}", path.display()),
            })
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, Error> {
        let mut deserializer = serde_json::Deserializer::from_str(contents);
        let definitions: Vec<SupportedModelDefinition> =
            serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
                Error::new(ErrorDetails::Catalog {
                    message: e.to_string(),
                })
            })?;
        Self::new(definitions)
    }

    pub fn new(definitions: Vec<SupportedModelDefinition>) -> Result<Self, Error> {
        let mut models = IndexMap::with_capacity(definitions.len());
        for definition in definitions {
            if definition.default_provider().is_none() {
                return Err(Error::new(ErrorDetails::Catalog {
                    message: format!("Model `{}` has no providers", definition.model_type),
                }));
            }
            let model_type = definition.model_type.clone();
            if models.insert(model_type.clone(), definition).is_some() {
                return Err(Error::new(ErrorDetails::Catalog {
                    message: format!("Model `{model_type}` is defined more than once"),
                }));
            }
        }
        Ok(Self { models })
    }

    pub fn get(&self, model_type: &str) -> Option<&SupportedModelDefinition> {
        self.models.get(model_type)
    }

    pub fn models(&self) -> impl Iterator<Item = &SupportedModelDefinition> {
        self.models.values()
    }

    /// Looks up `model_type` and checks that it serves the `expected` modality.
    pub fn get_supported_model_or_throw(
        &self,
        model_type: &str,
        expected: Modality,
    ) -> Result<&SupportedModelDefinition, Error> {
        let definition = self.get(model_type).ok_or_else(|| {
            Error::new(ErrorDetails::BadRequest {
                message: format!("Model '{model_type}' is not supported"),
                code: BadRequestCode::ModelUnsupported,
            })
        })?;
        if definition.modality != expected {
            return Err(Error::new(ErrorDetails::BadRequest {
                message: format!(
                    "Model '{model_type}' is a {} model, not a {expected} model",
                    definition.modality
                ),
                code: BadRequestCode::ModelMismatch,
            }));
        }
        Ok(definition)
    }
}
