//! OpenAI-compatible error handling.
//!
//! Handlers return `OpenAICompatibleError`, and request bodies are read with
//! `OpenAIStructuredJson`, so that every failure reaches the caller as
//! `{"error": {"message", "type", "param", "code"}}`.

use std::fmt;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::error::{Error, ErrorDetails};

/// A wrapper around `Error` for handler signatures.
#[derive(Debug)]
pub struct OpenAICompatibleError(pub Error);

impl From<Error> for OpenAICompatibleError {
    fn from(error: Error) -> Self {
        OpenAICompatibleError(error)
    }
}

impl fmt::Display for OpenAICompatibleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl IntoResponse for OpenAICompatibleError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

/// A JSON extractor whose rejections name the offending field and use the
/// OpenAI-compatible error format.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAIStructuredJson<T>(pub T);

impl<S, T> FromRequest<S> for OpenAIStructuredJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: Send + Sync + DeserializeOwned,
{
    type Rejection = OpenAICompatibleError;

    #[instrument(skip_all, level = "trace", name = "OpenAIStructuredJson::from_request")]
    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        // Retrieve the request body as Bytes before deserializing it
        let bytes = bytes::Bytes::from_request(req, state).await.map_err(|e| {
            OpenAICompatibleError(Error::new(ErrorDetails::JsonRequest {
                message: format!("{} ({})", e, e.status()),
            }))
        })?;

        // Convert the entire body into `serde_json::Value`
        let value = Json::<serde_json::Value>::from_bytes(&bytes)
            .map_err(|e| {
                OpenAICompatibleError(Error::new(ErrorDetails::JsonRequest {
                    message: format!("{} ({})", e, e.status()),
                }))
            })?
            .0;

        // Now use `serde_path_to_error::deserialize` to attempt deserialization into `T`
        let deserialized: T = serde_path_to_error::deserialize(&value).map_err(|e| {
            OpenAICompatibleError(Error::new(ErrorDetails::JsonRequest {
                message: e.to_string(),
            }))
        })?;

        Ok(OpenAIStructuredJson(deserialized))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::StatusCode;
    use serde::Deserialize;
    use serde_json::Value;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Params {
        #[expect(dead_code)]
        model: String,
        #[expect(dead_code)]
        input: Vec<String>,
    }

    #[tokio::test]
    async fn test_rejection_names_the_field() {
        let req = Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"model": "a/b/c", "input": [1]}"#))
            .unwrap();
        let err = OpenAIStructuredJson::<Params>::from_request(req, &())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("input[0]"), "Unexpected error: {err}");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value =
            serde_json::from_slice(&to_bytes(response.into_body(), 4096).await.unwrap()).unwrap();
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["code"], "validation_error");
        assert_eq!(body["error"]["param"], Value::Null);
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let req = Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let err = OpenAIStructuredJson::<Params>::from_request(req, &())
            .await
            .unwrap_err();
        assert!(matches!(err.0.get_details(), ErrorDetails::JsonRequest { .. }));
    }
}
