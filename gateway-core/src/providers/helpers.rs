use reqwest::{RequestBuilder, Response, StatusCode};
use reqwest_sse_stream::ReqwestSseStreamError;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{DisplayOrDebug, Error, ErrorDetails};
use crate::providers::ProviderName;

/// Serializes a request body, mapping failures to a gateway error.
pub fn serialize_request_body<T: Serialize>(
    provider: ProviderName,
    body: &T,
) -> Result<String, Error> {
    serde_json::to_string(body).map_err(|e| {
        Error::new(ErrorDetails::Serialization {
            message: format!(
                "Error serializing {provider} request: {}",
                DisplayOrDebug::display(e)
            ),
        })
    })
}

/// Sends a request and returns the raw successful response.
///
/// Non-2xx responses become `UpstreamHttp` errors carrying the vendor's body.
pub async fn send_request(
    provider: ProviderName,
    request_builder: RequestBuilder,
) -> Result<Response, Error> {
    let response = request_builder.send().await.map_err(|e| {
        Error::new(ErrorDetails::UpstreamTransport {
            provider,
            message: DisplayOrDebug::display(e).to_string(),
        })
    })?;
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(handle_upstream_error(provider, status, body))
}

/// Sends a request and deserializes the JSON response into `T`.
pub async fn send_and_parse<T: DeserializeOwned>(
    provider: ProviderName,
    request_builder: RequestBuilder,
) -> Result<T, Error> {
    let response = send_request(provider, request_builder).await?;
    let raw_response = response.text().await.map_err(|e| {
        Error::new(ErrorDetails::UpstreamTransport {
            provider,
            message: format!("Error reading response body: {}", DisplayOrDebug::display(e)),
        })
    })?;
    parse_response(provider, &raw_response)
}

pub fn parse_response<T: DeserializeOwned>(
    provider: ProviderName,
    raw_response: &str,
) -> Result<T, Error> {
    let mut deserializer = serde_json::Deserializer::from_str(raw_response);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        Error::new(ErrorDetails::UpstreamResponse {
            provider,
            message: format!("Error parsing JSON response: {e}"),
            raw_response: Some(raw_response.to_string()),
        })
    })
}

pub fn handle_upstream_error(provider: ProviderName, status: StatusCode, body: String) -> Error {
    Error::new(ErrorDetails::UpstreamHttp {
        provider,
        status,
        body,
    })
}

/// Converts a failure from the SSE reader into a gateway error.
///
/// A bad status or content type still has its response attached, so the
/// vendor's body is read and passed through.
pub async fn convert_stream_error(provider: ProviderName, e: ReqwestSseStreamError) -> Error {
    match e {
        ReqwestSseStreamError::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            handle_upstream_error(provider, status, body)
        }
        ReqwestSseStreamError::InvalidContentType(content_type, response) => {
            let raw_response = response.text().await.ok();
            Error::new(ErrorDetails::UpstreamResponse {
                provider,
                message: format!("Unexpected content type: {content_type:?}"),
                raw_response,
            })
        }
        ReqwestSseStreamError::ReqwestError(inner) => Error::new(ErrorDetails::UpstreamTransport {
            provider,
            message: DisplayOrDebug::display(inner).to_string(),
        }),
        ReqwestSseStreamError::SseError(message) => Error::new(ErrorDetails::UpstreamResponse {
            provider,
            message,
            raw_response: None,
        }),
    }
}

/// Joins a relative path onto a vendor base URL without dropping the base path.
pub fn join_url(base: &url::Url, path: &str) -> Result<url::Url, Error> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path_with_slash = format!("{}/", base.path());
        base.set_path(&path_with_slash);
    }
    base.join(path.trim_start_matches('/')).map_err(|e| {
        Error::new(ErrorDetails::Config {
            message: format!("Failed to build URL from `{base}` and `{path}`: {e}"),
        })
    })
}
