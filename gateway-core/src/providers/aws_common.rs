//! AWS plumbing shared by the Bedrock and Vertex adapters.

use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::Region;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use aws_smithy_runtime_api::client::stalled_stream_protection::StalledStreamProtectionConfig;
use aws_smithy_types::event_stream::Message;
use aws_types::SdkConfig;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

#[cfg(test)]
use mockall::automock;

use crate::error::{DisplayOrDebug, Error, ErrorDetails};
use crate::providers::ProviderName;
use crate::providers::helpers::send_request;

pub const ECS_CREDENTIALS_HOST: &str = "http://169.254.170.2";
pub const ECS_CREDENTIALS_RELATIVE_URI_ENV: &str = "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI";

const CREDENTIALS_PROVIDER_NAME: &str = "gateway";

/// Loads the ambient AWS configuration for `region`.
pub async fn config_with_region(region: &str) -> SdkConfig {
    tracing::trace!("Creating new AWS config for region: {region}");
    aws_config::from_env()
        .region(Region::new(region.to_string()))
        // The stalled stream protection misfires on long model responses.
        .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
        .load()
        .await
}

/// The STS calls the adapters depend on.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait StsOperations: Send + Sync {
    async fn assume_role(&self, role_arn: &str, session_name: &str) -> Result<Credentials, Error>;

    async fn get_session_token(&self) -> Result<Credentials, Error>;
}

/// `StsOperations` backed by the AWS SDK.
#[derive(Debug)]
pub struct SdkStsClient {
    client: aws_sdk_sts::Client,
    provider: ProviderName,
}

impl SdkStsClient {
    pub async fn new(region: &str, provider: ProviderName) -> Self {
        let config = config_with_region(region).await;
        Self {
            client: aws_sdk_sts::Client::new(&config),
            provider,
        }
    }

    fn auth_error(&self, message: String) -> Error {
        Error::new(ErrorDetails::UpstreamAuthFailed {
            provider: self.provider,
            message,
        })
    }
}

fn convert_sts_credentials(
    credentials: &aws_sdk_sts::types::Credentials,
) -> Credentials {
    let expiry = SystemTime::try_from(*credentials.expiration()).ok();
    Credentials::new(
        credentials.access_key_id(),
        credentials.secret_access_key(),
        Some(credentials.session_token().to_string()),
        expiry,
        CREDENTIALS_PROVIDER_NAME,
    )
}

#[async_trait]
impl StsOperations for SdkStsClient {
    async fn assume_role(&self, role_arn: &str, session_name: &str) -> Result<Credentials, Error> {
        let output = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .send()
            .await
            .map_err(|e| {
                self.auth_error(format!(
                    "Failed to assume role `{role_arn}`: {}",
                    DisplayOrDebug::debug(e)
                ))
            })?;
        output
            .credentials()
            .map(convert_sts_credentials)
            .ok_or_else(|| self.auth_error(format!("AssumeRole for `{role_arn}` returned no credentials")))
    }

    async fn get_session_token(&self) -> Result<Credentials, Error> {
        let output = self.client.get_session_token().send().await.map_err(|e| {
            self.auth_error(format!(
                "Failed to get an STS session token: {}",
                DisplayOrDebug::debug(e)
            ))
        })?;
        output
            .credentials()
            .map(convert_sts_credentials)
            .ok_or_else(|| self.auth_error("GetSessionToken returned no credentials".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EcsCredentialsResponse {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
}

/// Reads task credentials from the ECS container metadata endpoint.
///
/// Returns `Ok(None)` when the container does not expose a credentials URI.
pub async fn fetch_ecs_credentials(
    http_client: &reqwest::Client,
    provider: ProviderName,
) -> Result<Option<Credentials>, Error> {
    let Ok(relative_uri) = std::env::var(ECS_CREDENTIALS_RELATIVE_URI_ENV) else {
        return Ok(None);
    };
    let url = format!("{ECS_CREDENTIALS_HOST}{relative_uri}");
    fetch_credentials_from_endpoint(http_client, &url, provider)
        .await
        .map(Some)
}

pub async fn fetch_credentials_from_endpoint(
    http_client: &reqwest::Client,
    url: &str,
    provider: ProviderName,
) -> Result<Credentials, Error> {
    let auth_error = |message: String| {
        Error::new(ErrorDetails::UpstreamAuthFailed { provider, message })
    };
    let response = send_request(provider, http_client.get(url))
        .await
        .map_err(|e| auth_error(format!("Failed to fetch container credentials: {e}")))?;
    let credentials: EcsCredentialsResponse = response
        .json()
        .await
        .map_err(|e| auth_error(format!("Invalid container credentials response: {e}")))?;
    Ok(Credentials::new(
        credentials.access_key_id,
        credentials.secret_access_key,
        credentials.token,
        None,
        CREDENTIALS_PROVIDER_NAME,
    ))
}

/// Signs a request with SigV4 and returns `headers` plus the signature headers.
#[expect(clippy::too_many_arguments)]
pub fn sign_request(
    method: &str,
    url: &str,
    headers: &HeaderMap,
    body: &[u8],
    credentials: &Credentials,
    region: &str,
    service: &str,
    provider: ProviderName,
) -> Result<HeaderMap, Error> {
    let signing_error = |message: String| {
        Error::new(ErrorDetails::UpstreamAuthFailed { provider, message })
    };
    let identity: Identity = credentials.clone().into();
    let signing_params = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name(service)
        .time(SystemTime::now())
        .settings(SigningSettings::default())
        .build()
        .map_err(|e| signing_error(format!("Failed to build signing parameters: {e}")))?
        .into();

    let header_pairs = headers
        .iter()
        .map(|(name, value)| Ok((name.as_str(), value.to_str()?)))
        .collect::<Result<Vec<_>, http::header::ToStrError>>()
        .map_err(|e| signing_error(format!("Request header is not valid ASCII: {e}")))?;
    let signable_request = SignableRequest::new(
        method,
        url,
        header_pairs.into_iter(),
        SignableBody::Bytes(body),
    )
    .map_err(|e| signing_error(format!("Failed to build signable request: {e}")))?;
    let (instructions, _signature) = sign(signable_request, &signing_params)
        .map_err(|e| signing_error(format!("Failed to sign request: {e}")))?
        .into_parts();

    let mut signed_headers = headers.clone();
    for (name, value) in instructions.headers() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| signing_error(format!("Invalid signature header name: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| signing_error(format!("Invalid signature header value: {e}")))?;
        signed_headers.insert(name, value);
    }
    Ok(signed_headers)
}

/// Signs and sends a JSON request, returning the raw response body.
#[expect(clippy::too_many_arguments)]
pub async fn send_aws_request(
    http_client: &reqwest::Client,
    url: &str,
    body: Vec<u8>,
    credentials: &Credentials,
    region: &str,
    service: &str,
    provider: ProviderName,
    accept: &'static str,
) -> Result<reqwest::Response, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(http::header::ACCEPT, HeaderValue::from_static(accept));
    let signed_headers = sign_request(
        "POST",
        url,
        &headers,
        &body,
        credentials,
        region,
        service,
        provider,
    )?;
    send_request(provider, http_client.post(url).headers(signed_headers).body(body)).await
}

/// Returns the exception type and message if `message` is an eventstream exception frame.
pub fn check_eventstream_exception(message: &Message) -> Option<(String, String)> {
    let header = |name: &str| {
        message
            .headers()
            .iter()
            .find(|h| h.name().as_str() == name)
            .and_then(|h| h.value().as_string().ok())
            .map(|s| s.as_str().to_owned())
    };
    match header(":message-type").as_deref() {
        Some("exception") => {
            let exception_type = header(":exception-type").unwrap_or_else(|| "unknown".to_string());
            Some((
                exception_type,
                String::from_utf8_lossy(message.payload()).to_string(),
            ))
        }
        Some("error") => Some((
            header(":error-code").unwrap_or_else(|| "unknown".to_string()),
            header(":error-message").unwrap_or_default(),
        )),
        _ => None,
    }
}

/// The `:event-type` header of an eventstream frame.
pub fn eventstream_event_type(message: &Message) -> Option<String> {
    message
        .headers()
        .iter()
        .find(|h| h.name().as_str() == ":event-type")
        .and_then(|h| h.value().as_string().ok())
        .map(|s| s.as_str().to_owned())
}
