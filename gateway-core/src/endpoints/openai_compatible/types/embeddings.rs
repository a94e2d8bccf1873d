//! Request and response types for the embeddings endpoint.

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorDetails};
use crate::inference::types::EmbeddingResult;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

#[derive(Debug, Deserialize)]
pub struct OpenAICompatibleEmbeddingParams {
    /// The alias path `<agent>/<branch>/<alias>`.
    pub model: String,
    pub input: EmbeddingInput,
}

impl OpenAICompatibleEmbeddingParams {
    /// The inputs to embed, in order. Empty input is rejected.
    pub fn inputs(&self) -> Result<Vec<String>, Error> {
        let inputs = match &self.input {
            EmbeddingInput::Single(input) => vec![input.clone()],
            EmbeddingInput::Batch(inputs) => inputs.clone(),
        };
        if inputs.is_empty() || inputs.iter().all(String::is_empty) {
            return Err(Error::new(ErrorDetails::JsonRequest {
                message: "`input` must contain at least one non-empty string".to_string(),
            }));
        }
        Ok(inputs)
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "object", rename_all = "lowercase")]
pub enum OpenAIEmbeddingResponse {
    List {
        data: Vec<OpenAIEmbedding>,
        model: String,
        usage: OpenAIEmbeddingUsage,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "object", rename_all = "lowercase")]
pub enum OpenAIEmbedding {
    Embedding { embedding: Vec<f32>, index: usize },
}

#[derive(Debug, Serialize)]
pub struct OpenAIEmbeddingUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

impl OpenAIEmbeddingResponse {
    /// `model` is echoed back exactly as the caller sent it.
    pub fn new(result: EmbeddingResult, model: String) -> Self {
        let tokens = result.input_tokens.unwrap_or_default();
        OpenAIEmbeddingResponse::List {
            data: result
                .embeddings
                .into_iter()
                .enumerate()
                .map(|(index, embedding)| OpenAIEmbedding::Embedding { embedding, index })
                .collect(),
            model,
            usage: OpenAIEmbeddingUsage {
                prompt_tokens: tokens,
                // there are no output tokens for embeddings
                total_tokens: tokens,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_inputs() {
        let single: OpenAICompatibleEmbeddingParams =
            serde_json::from_value(json!({"model": "acme/main/embed", "input": "hello"})).unwrap();
        assert_eq!(single.inputs().unwrap(), vec!["hello".to_string()]);

        let batch: OpenAICompatibleEmbeddingParams =
            serde_json::from_value(json!({"model": "acme/main/embed", "input": ["a", "b"]}))
                .unwrap();
        assert_eq!(batch.inputs().unwrap().len(), 2);

        let empty: OpenAICompatibleEmbeddingParams =
            serde_json::from_value(json!({"model": "acme/main/embed", "input": []})).unwrap();
        let err = empty.inputs().unwrap_err();
        assert!(matches!(err.get_details(), ErrorDetails::JsonRequest { .. }));
    }

    #[test]
    fn test_response_shape() {
        let response = OpenAIEmbeddingResponse::new(
            EmbeddingResult {
                embeddings: vec![vec![0.5, -0.25], vec![1.0, 0.0]],
                input_tokens: Some(4),
            },
            "acme/main/embed".to_string(),
        );
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({
                "object": "list",
                "data": [
                    {"object": "embedding", "embedding": [0.5, -0.25], "index": 0},
                    {"object": "embedding", "embedding": [1.0, 0.0], "index": 1}
                ],
                "model": "acme/main/embed",
                "usage": {"prompt_tokens": 4, "total_tokens": 4}
            })
        );
    }
}
