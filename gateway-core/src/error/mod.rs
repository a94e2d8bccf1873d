use std::fmt::{Debug, Display};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::providers::ProviderName;

/// The `code` attached to a 400 `invalid_request_error` that callers can branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BadRequestCode {
    ModelMismatch,
    ModelUnsupported,
    ProviderUnsupported,
}

#[derive(Clone, Debug, Error, Serialize)]
#[cfg_attr(test, derive(PartialEq))]
#[error(transparent)]
// As long as the struct member is private, we force people to use the `new` method and log the error.
pub struct Error(Arc<ErrorDetails>);

impl Error {
    pub fn new(details: ErrorDetails) -> Self {
        details.log();
        Error(Arc::new(details))
    }

    pub fn status_code(&self) -> StatusCode {
        self.0.status_code()
    }

    pub fn get_details(&self) -> &ErrorDetails {
        &self.0
    }

    pub fn log(&self) {
        self.0.log();
    }

    pub fn log_at_level(&self, prefix: &str, level: tracing::Level) {
        self.0.log_at_level(prefix, level);
    }
}

impl From<ErrorDetails> for Error {
    fn from(details: ErrorDetails) -> Self {
        Error::new(details)
    }
}

#[derive(Debug, Error, Serialize)]
#[cfg_attr(test, derive(PartialEq))]
pub enum ErrorDetails {
    BadRequest {
        message: String,
        code: BadRequestCode,
    },
    BranchNotFound {
        agent_slug: String,
        branch_slug: String,
    },
    Catalog {
        message: String,
    },
    Config {
        message: String,
    },
    DanglingToolResult {
        tool_call_id: String,
    },
    InvalidDataUri {
        message: String,
    },
    InvalidModelPath {
        path: String,
    },
    InvalidProviderConfig {
        provider: ProviderName,
        message: String,
    },
    InvalidReasoningParams {
        message: String,
    },
    InvalidToolCallArguments {
        tool_call_id: String,
        message: String,
    },
    JsonRequest {
        message: String,
    },
    MissingSecret {
        name: String,
    },
    ModelNotFound {
        model: String,
    },
    Observability {
        message: String,
    },
    PostgresConnectionInitialization {
        message: String,
    },
    PostgresMigration {
        message: String,
    },
    PostgresQuery {
        message: String,
    },
    RouteNotFound {
        path: String,
        method: String,
    },
    Serialization {
        message: String,
    },
    UpstreamAuthFailed {
        provider: ProviderName,
        message: String,
    },
    /// A failed HTTP response from a vendor API. The body is kept so it can be
    /// passed through to the caller unchanged.
    UpstreamHttp {
        provider: ProviderName,
        #[serde(serialize_with = "serialize_status")]
        status: StatusCode,
        body: String,
    },
    UpstreamResponse {
        provider: ProviderName,
        message: String,
        raw_response: Option<String>,
    },
    UpstreamTransport {
        provider: ProviderName,
        message: String,
    },
}

// Expect for derive Serialize
#[expect(clippy::trivially_copy_pass_by_ref)]
fn serialize_status<S>(code: &StatusCode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u16(code.as_u16())
}

impl ErrorDetails {
    /// Defines the error level for logging this error
    fn level(&self) -> tracing::Level {
        match self {
            ErrorDetails::BadRequest { .. } => tracing::Level::WARN,
            ErrorDetails::BranchNotFound { .. } => tracing::Level::WARN,
            ErrorDetails::Catalog { .. } => tracing::Level::ERROR,
            ErrorDetails::Config { .. } => tracing::Level::ERROR,
            ErrorDetails::DanglingToolResult { .. } => tracing::Level::WARN,
            ErrorDetails::InvalidDataUri { .. } => tracing::Level::WARN,
            ErrorDetails::InvalidModelPath { .. } => tracing::Level::WARN,
            ErrorDetails::InvalidProviderConfig { .. } => tracing::Level::ERROR,
            ErrorDetails::InvalidReasoningParams { .. } => tracing::Level::WARN,
            ErrorDetails::InvalidToolCallArguments { .. } => tracing::Level::WARN,
            ErrorDetails::JsonRequest { .. } => tracing::Level::WARN,
            ErrorDetails::MissingSecret { .. } => tracing::Level::ERROR,
            ErrorDetails::ModelNotFound { .. } => tracing::Level::WARN,
            ErrorDetails::Observability { .. } => tracing::Level::ERROR,
            ErrorDetails::PostgresConnectionInitialization { .. } => tracing::Level::ERROR,
            ErrorDetails::PostgresMigration { .. } => tracing::Level::ERROR,
            ErrorDetails::PostgresQuery { .. } => tracing::Level::ERROR,
            ErrorDetails::RouteNotFound { .. } => tracing::Level::WARN,
            ErrorDetails::Serialization { .. } => tracing::Level::ERROR,
            ErrorDetails::UpstreamAuthFailed { .. } => tracing::Level::ERROR,
            ErrorDetails::UpstreamHttp { .. } => tracing::Level::WARN,
            ErrorDetails::UpstreamResponse { .. } => tracing::Level::ERROR,
            ErrorDetails::UpstreamTransport { .. } => tracing::Level::ERROR,
        }
    }

    /// Defines the HTTP status code for responses involving this error
    fn status_code(&self) -> StatusCode {
        match self {
            ErrorDetails::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::BranchNotFound { .. } => StatusCode::NOT_FOUND,
            ErrorDetails::Catalog { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::DanglingToolResult { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InvalidDataUri { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::InvalidModelPath { .. } => StatusCode::NOT_FOUND,
            ErrorDetails::InvalidProviderConfig { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InvalidReasoningParams { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::InvalidToolCallArguments { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::JsonRequest { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::MissingSecret { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            ErrorDetails::Observability { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::PostgresConnectionInitialization { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorDetails::PostgresMigration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::PostgresQuery { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            ErrorDetails::Serialization { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::UpstreamAuthFailed { .. } => StatusCode::BAD_GATEWAY,
            ErrorDetails::UpstreamHttp { status, .. } => *status,
            ErrorDetails::UpstreamResponse { .. } => StatusCode::BAD_GATEWAY,
            ErrorDetails::UpstreamTransport { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// The OpenAI-compatible `error.type` for this error
    pub fn error_type(&self) -> &'static str {
        match self {
            ErrorDetails::UpstreamAuthFailed { .. } => "upstream_auth_failed",
            ErrorDetails::UpstreamHttp { status, .. } => {
                if status.is_server_error() {
                    "server_error"
                } else {
                    "invalid_request_error"
                }
            }
            _ => {
                if self.status_code().is_client_error() {
                    "invalid_request_error"
                } else {
                    "server_error"
                }
            }
        }
    }

    /// The OpenAI-compatible `error.code` for this error
    pub fn code(&self) -> Option<&str> {
        match self {
            ErrorDetails::BadRequest { code, .. } => Some(code.as_ref()),
            ErrorDetails::JsonRequest { .. } => Some("validation_error"),
            ErrorDetails::BranchNotFound { .. }
            | ErrorDetails::InvalidModelPath { .. }
            | ErrorDetails::ModelNotFound { .. }
            | ErrorDetails::RouteNotFound { .. } => Some("not_found"),
            ErrorDetails::UpstreamAuthFailed { .. } => Some("upstream_auth_failed"),
            ErrorDetails::InvalidDataUri { .. }
            | ErrorDetails::InvalidReasoningParams { .. }
            | ErrorDetails::InvalidToolCallArguments { .. }
            | ErrorDetails::UpstreamHttp { .. } => None,
            ErrorDetails::UpstreamResponse { .. } | ErrorDetails::UpstreamTransport { .. } => {
                Some("upstream_error")
            }
            ErrorDetails::Catalog { .. }
            | ErrorDetails::Config { .. }
            | ErrorDetails::DanglingToolResult { .. }
            | ErrorDetails::InvalidProviderConfig { .. }
            | ErrorDetails::MissingSecret { .. }
            | ErrorDetails::Observability { .. }
            | ErrorDetails::PostgresConnectionInitialization { .. }
            | ErrorDetails::PostgresMigration { .. }
            | ErrorDetails::PostgresQuery { .. }
            | ErrorDetails::Serialization { .. } => Some("internal"),
        }
    }

    pub fn log_at_level(&self, prefix: &str, level: tracing::Level) {
        match level {
            tracing::Level::ERROR => tracing::error!("{prefix}{self}"),
            tracing::Level::WARN => tracing::warn!("{prefix}{self}"),
            tracing::Level::INFO => tracing::info!("{prefix}{self}"),
            tracing::Level::DEBUG => tracing::debug!("{prefix}{self}"),
            tracing::Level::TRACE => tracing::trace!("{prefix}{self}"),
        }
    }

    /// Log the error using the `tracing` library
    pub fn log(&self) {
        self.log_at_level("", self.level());
    }

    /// Builds the OpenAI-compatible `{"error": {...}}` body.
    ///
    /// An upstream JSON body that already carries an `error` key is returned as-is.
    pub fn to_openai_body(&self) -> Value {
        if let ErrorDetails::UpstreamHttp { body, .. } = self
            && let Ok(value) = serde_json::from_str::<Value>(body)
            && value.get("error").is_some()
        {
            return value;
        }
        json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "param": Value::Null,
                "code": self.code(),
            }
        })
    }
}

impl std::fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorDetails::BadRequest { message, .. } => write!(f, "{message}"),
            ErrorDetails::BranchNotFound {
                agent_slug,
                branch_slug,
            } => {
                write!(f, "Branch `{branch_slug}` not found for agent `{agent_slug}`")
            }
            ErrorDetails::Catalog { message } => write!(f, "Error loading model catalog: {message}"),
            ErrorDetails::Config { message } => write!(f, "{message}"),
            ErrorDetails::DanglingToolResult { tool_call_id } => write!(
                f,
                "Tool call with id '{tool_call_id}' not found in assistant messages."
            ),
            ErrorDetails::InvalidDataUri { message } => write!(f, "Invalid data URI: {message}"),
            ErrorDetails::InvalidModelPath { path } => write!(
                f,
                "Model '{path}' not found: expected the form '<agent>/<branch>/<alias>'"
            ),
            ErrorDetails::InvalidProviderConfig { provider, message } => {
                write!(f, "Invalid configuration for provider '{provider}': {message}")
            }
            ErrorDetails::InvalidReasoningParams { message } => write!(f, "{message}"),
            ErrorDetails::InvalidToolCallArguments {
                tool_call_id,
                message,
            } => write!(
                f,
                "Arguments of tool call '{tool_call_id}' are not valid JSON: {message}"
            ),
            ErrorDetails::JsonRequest { message } => write!(f, "{message}"),
            ErrorDetails::MissingSecret { name } => write!(f, "Secret `{name}` is not set"),
            ErrorDetails::ModelNotFound { model } => write!(f, "Model '{model}' not found"),
            ErrorDetails::Observability { message } => write!(f, "{message}"),
            ErrorDetails::PostgresConnectionInitialization { message } => {
                write!(f, "Postgres connection initialization failed: {message}")
            }
            ErrorDetails::PostgresMigration { message } => {
                write!(f, "Error running Postgres migrations: {message}")
            }
            ErrorDetails::PostgresQuery { message } => {
                write!(f, "Postgres query failed: {message}")
            }
            ErrorDetails::RouteNotFound { path, method } => {
                write!(f, "Route not found: {method} {path}")
            }
            ErrorDetails::Serialization { message } => write!(f, "{message}"),
            ErrorDetails::UpstreamAuthFailed { provider, message } => {
                write!(f, "Authentication with provider '{provider}' failed: {message}")
            }
            ErrorDetails::UpstreamHttp { status, body, .. } => {
                if body.is_empty() {
                    write!(f, "Upstream error ({})", status.as_u16())
                } else {
                    write!(f, "{body}")
                }
            }
            ErrorDetails::UpstreamResponse {
                provider, message, ..
            } => write!(f, "Invalid response from provider '{provider}': {message}"),
            ErrorDetails::UpstreamTransport { provider, message } => {
                write!(f, "Error sending request to provider '{provider}': {message}")
            }
        }
    }
}

impl IntoResponse for Error {
    /// Log the error and convert it into an Axum response
    fn into_response(self) -> Response {
        let body = self.get_details().to_openai_body();
        let mut response = (self.status_code(), Json(body)).into_response();
        // Attach the error to the response, so that the trace layer can see it
        response.extensions_mut().insert(self);
        response
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorDetails::Serialization {
            message: err.to_string(),
        })
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::new(ErrorDetails::PostgresQuery {
            message: err.to_string(),
        })
    }
}

/// Chooses between a `Debug` or `Display` representation of an error from a third-party crate.
/// Several AWS SDK errors only have a useful message in their `Debug` output.
pub struct DisplayOrDebug<T: Debug + Display> {
    val: T,
    debug: bool,
}

impl<T: Debug + Display> DisplayOrDebug<T> {
    pub fn display(val: T) -> Self {
        Self { val, debug: false }
    }

    pub fn debug(val: T) -> Self {
        Self { val, debug: true }
    }
}

impl<T: Debug + Display> Display for DisplayOrDebug<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.debug {
            write!(f, "{:?}", self.val)
        } else {
            write!(f, "{}", self.val)
        }
    }
}
