//! Turns a `reqwest::RequestBuilder` into a stream of server-sent events.
//!
//! Unlike `Response::error_for_status`, a non-success status keeps hold of the
//! `Response`, so callers can forward the upstream error body verbatim.

use futures::{Stream, StreamExt};
use http::StatusCode;
use http::header::HeaderValue;
use sse_stream::SseStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReqwestSseStreamError {
    #[error("Reqwest error: {0}")]
    ReqwestError(reqwest::Error),
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(StatusCode, reqwest::Response),
    #[error("Expected content-type 'text/event-stream', got {0:?}")]
    InvalidContentType(HeaderValue, reqwest::Response),
    #[error("Error decoding server-sent event: {0}")]
    SseError(String),
}

/// A single SSE message with non-empty `data`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Open,
    Message(MessageEvent),
}

/// Sends the request and returns its body as a stream of events.
/// The first item of a successful stream is always `Event::Open`.
pub async fn into_sse_stream(
    builder: reqwest::RequestBuilder,
) -> Result<impl Stream<Item = Result<Event, ReqwestSseStreamError>> + Send + 'static, ReqwestSseStreamError>
{
    let response = builder
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(ReqwestSseStreamError::ReqwestError)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ReqwestSseStreamError::InvalidStatusCode(status, response));
    }

    match response.headers().get(reqwest::header::CONTENT_TYPE) {
        Some(content_type) => {
            let is_event_stream = content_type.to_str().ok().is_some_and(|s| {
                s.split(';')
                    .next()
                    .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("text/event-stream"))
            });
            if !is_event_stream {
                let content_type = content_type.clone();
                return Err(ReqwestSseStreamError::InvalidContentType(
                    content_type,
                    response,
                ));
            }
        }
        None => {
            return Err(ReqwestSseStreamError::InvalidContentType(
                HeaderValue::from_static(""),
                response,
            ));
        }
    }

    Ok(events_from_byte_stream(response.bytes_stream()))
}

/// Decodes an already-open byte stream into events.
pub fn events_from_byte_stream<S>(
    bytes: S,
) -> impl Stream<Item = Result<Event, ReqwestSseStreamError>> + Send + 'static
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
{
    let messages = SseStream::from_byte_stream(bytes).filter_map(|item| async move {
        match item {
            Ok(sse) => sse.data.map(|data| {
                Ok(Event::Message(MessageEvent {
                    event: sse.event,
                    data,
                    id: sse.id,
                }))
            }),
            Err(e) => Some(Err(ReqwestSseStreamError::SseError(e.to_string()))),
        }
    });
    futures::stream::iter([Ok(Event::Open)]).chain(messages)
}
