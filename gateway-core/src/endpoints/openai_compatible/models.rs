//! The model list, served straight from the catalog.

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use crate::catalog::SupportedModelDefinition;
use crate::error::{Error, ErrorDetails};
use crate::utils::gateway::AppState;

use super::OpenAICompatibleError;

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "object", rename_all = "lowercase")]
pub enum OpenAICompatibleModelList {
    List { data: Vec<OpenAICompatibleModel> },
}

#[derive(Debug, PartialEq, Serialize)]
pub struct OpenAICompatibleModel {
    pub id: String,
    pub object: &'static str,
    /// The catalog does not track release dates.
    pub created: u64,
    pub owned_by: &'static str,
}

impl From<&SupportedModelDefinition> for OpenAICompatibleModel {
    fn from(definition: &SupportedModelDefinition) -> Self {
        OpenAICompatibleModel {
            id: definition.model_type.clone(),
            object: "model",
            created: 0,
            owned_by: "gateway",
        }
    }
}

pub async fn list_models_handler(State(app_state): AppState) -> Json<OpenAICompatibleModelList> {
    Json(OpenAICompatibleModelList::List {
        data: app_state
            .catalog
            .models()
            .map(OpenAICompatibleModel::from)
            .collect(),
    })
}

pub async fn get_model_handler(
    State(app_state): AppState,
    Path(model_id): Path<String>,
) -> Result<Json<OpenAICompatibleModel>, OpenAICompatibleError> {
    let definition = app_state.catalog.get(&model_id).ok_or_else(|| {
        Error::new(ErrorDetails::ModelNotFound {
            model: model_id.clone(),
        })
    })?;
    Ok(Json(OpenAICompatibleModel::from(definition)))
}
