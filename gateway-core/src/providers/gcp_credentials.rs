//! Workload identity federation from AWS to Google Cloud.
//!
//! The gateway runs on AWS and holds no Google key. It proves its AWS identity
//! with a signed `GetCallerIdentity` request, swaps that for a federated token at
//! Google STS, then impersonates the configured service account.

use std::sync::Arc;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use chrono::{DateTime, Duration, Utc};
use http::{HeaderMap, HeaderName, HeaderValue};
use lazy_static::lazy_static;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

#[cfg(test)]
use mockall::automock;

use super::aws_common::{SdkStsClient, StsOperations, fetch_ecs_credentials, sign_request};
use super::helpers::{join_url, send_request, serialize_request_body};
use super::{ProviderContext, ProviderName};
use crate::error::{DisplayOrDebug, Error, ErrorDetails};

const PROVIDER_NAME: ProviderName = ProviderName::Vertex;
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
const AWS_SUBJECT_TOKEN_TYPE: &str = "urn:ietf:params:aws:token-type:aws4_request";
const DEFAULT_AWS_REGION: &str = "us-east-1";
const GOOG_TARGET_RESOURCE_HEADER: &str = "x-goog-cloud-target-resource";
/// Tokens are refreshed once they are this close to expiring.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

lazy_static! {
    static ref GOOGLE_STS_TOKEN_URL: Url = {
        #[expect(clippy::expect_used)]
        Url::parse("https://sts.googleapis.com/v1/token").expect("Failed to parse GOOGLE_STS_TOKEN_URL")
    };
    static ref IAM_CREDENTIALS_BASE_URL: Url = {
        #[expect(clippy::expect_used)]
        Url::parse("https://iamcredentials.googleapis.com/v1/")
            .expect("Failed to parse IAM_CREDENTIALS_BASE_URL")
    };
}

fn auth_error(message: String) -> Error {
    Error::new(ErrorDetails::UpstreamAuthFailed {
        provider: PROVIDER_NAME,
        message,
    })
}

/// AWS credentials plus the region their STS endpoint lives in.
#[derive(Clone, Debug)]
pub struct AwsSigningIdentity {
    pub credentials: Credentials,
    pub region: String,
}

/// Where the AWS half of the exchange gets its credentials.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait AwsIdentitySource: Send + Sync {
    async fn identity(&self) -> Result<AwsSigningIdentity, Error>;
}

/// Uses ECS task credentials when running in a container, and a session token
/// from the ambient AWS profile otherwise.
pub struct AmbientAwsIdentity {
    http_client: reqwest::Client,
    is_remote: bool,
}

impl AmbientAwsIdentity {
    pub fn new(ctx: &ProviderContext) -> Self {
        Self {
            http_client: ctx.http_client.clone(),
            is_remote: ctx.is_remote,
        }
    }
}

#[async_trait]
impl AwsIdentitySource for AmbientAwsIdentity {
    async fn identity(&self) -> Result<AwsSigningIdentity, Error> {
        let sdk_config = aws_config::from_env().load().await;
        let region = sdk_config
            .region()
            .map(|region| region.as_ref().to_string())
            .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string());
        if self.is_remote
            && let Some(credentials) = fetch_ecs_credentials(&self.http_client, PROVIDER_NAME).await?
        {
            return Ok(AwsSigningIdentity {
                credentials,
                region,
            });
        }
        tracing::debug!("No container credentials available, requesting an STS session token");
        let sts = SdkStsClient::new(&region, PROVIDER_NAME).await;
        Ok(AwsSigningIdentity {
            credentials: sts.get_session_token().await?,
            region,
        })
    }
}

/// The Google endpoints used by the exchange.
#[derive(Clone, Debug)]
pub struct GoogleAuthEndpoints {
    pub sts_token_url: Url,
    pub iam_credentials_base_url: Url,
}

impl Default for GoogleAuthEndpoints {
    fn default() -> Self {
        Self {
            sts_token_url: GOOGLE_STS_TOKEN_URL.clone(),
            iam_credentials_base_url: IAM_CREDENTIALS_BASE_URL.clone(),
        }
    }
}

#[derive(Clone)]
struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

/// Hands out service-account access tokens, refreshing them shortly before expiry.
pub struct WorkloadIdentityCredentials {
    audience: String,
    service_account_email: String,
    http_client: reqwest::Client,
    aws_identity: Arc<dyn AwsIdentitySource>,
    endpoints: GoogleAuthEndpoints,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for WorkloadIdentityCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadIdentityCredentials")
            .field("audience", &self.audience)
            .field("service_account_email", &self.service_account_email)
            .finish_non_exhaustive()
    }
}

impl WorkloadIdentityCredentials {
    pub fn new(
        audience: String,
        service_account_email: String,
        http_client: reqwest::Client,
        aws_identity: Arc<dyn AwsIdentitySource>,
        endpoints: GoogleAuthEndpoints,
    ) -> Self {
        Self {
            audience,
            service_account_email,
            http_client,
            aws_identity,
            endpoints,
            cached: Mutex::new(None),
        }
    }

    /// A valid access token for the impersonated service account.
    pub async fn access_token(&self) -> Result<SecretString, Error> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at - Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > Utc::now()
        {
            return Ok(token.token.clone());
        }
        tracing::debug!(
            "Exchanging AWS credentials for a token of `{}`",
            self.service_account_email
        );
        let token = self.fetch_access_token().await?;
        let access_token = token.token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn fetch_access_token(&self) -> Result<CachedToken, Error> {
        let identity = self.aws_identity.identity().await?;
        let subject_token = build_subject_token(&identity, &self.audience)?;
        let federated_token = self.exchange_subject_token(subject_token).await?;
        self.impersonate_service_account(&federated_token).await
    }

    async fn exchange_subject_token(&self, subject_token: String) -> Result<SecretString, Error> {
        let body = serialize_request_body(
            PROVIDER_NAME,
            &TokenExchangeRequest {
                grant_type: TOKEN_EXCHANGE_GRANT_TYPE,
                audience: &self.audience,
                scope: CLOUD_PLATFORM_SCOPE,
                requested_token_type: ACCESS_TOKEN_TYPE,
                subject_token_type: AWS_SUBJECT_TOKEN_TYPE,
                subject_token,
            },
        )?;
        let request = self
            .http_client
            .post(self.endpoints.sts_token_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        let response: TokenExchangeResponse = read_json(request, "token exchange").await?;
        Ok(response.access_token)
    }

    async fn impersonate_service_account(
        &self,
        federated_token: &SecretString,
    ) -> Result<CachedToken, Error> {
        let url = join_url(
            &self.endpoints.iam_credentials_base_url,
            &format!(
                "projects/-/serviceAccounts/{}:generateAccessToken",
                self.service_account_email
            ),
        )?;
        let body = serialize_request_body(
            PROVIDER_NAME,
            &GenerateAccessTokenRequest {
                scope: &[CLOUD_PLATFORM_SCOPE],
            },
        )?;
        let request = self
            .http_client
            .post(url)
            .bearer_auth(federated_token.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        let response: GenerateAccessTokenResponse =
            read_json(request, "service account impersonation").await?;
        Ok(CachedToken {
            token: response.access_token,
            expires_at: response.expire_time,
        })
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    step: &str,
) -> Result<T, Error> {
    let response = send_request(PROVIDER_NAME, request)
        .await
        .map_err(|e| auth_error(format!("GCP {step} failed: {e}")))?;
    response.json().await.map_err(|e| {
        auth_error(format!(
            "Invalid GCP {step} response: {}",
            DisplayOrDebug::display(e)
        ))
    })
}

#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    grant_type: &'static str,
    audience: &'a str,
    scope: &'static str,
    requested_token_type: &'static str,
    subject_token_type: &'static str,
    subject_token: String,
}

#[derive(Deserialize)]
struct TokenExchangeResponse {
    access_token: SecretString,
}

#[derive(Debug, Serialize)]
struct GenerateAccessTokenRequest<'a> {
    scope: &'a [&'a str],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
    access_token: SecretString,
    expire_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct SubjectToken<'a> {
    url: &'a str,
    method: &'static str,
    headers: Vec<SubjectTokenHeader>,
}

#[derive(Debug, Serialize)]
struct SubjectTokenHeader {
    key: String,
    value: String,
}

/// Builds the url-encoded AWS subject token Google STS expects: a serialized,
/// SigV4-signed `GetCallerIdentity` request bound to `audience`.
pub fn build_subject_token(identity: &AwsSigningIdentity, audience: &str) -> Result<String, Error> {
    let region = &identity.region;
    let host = format!("sts.{region}.amazonaws.com");
    let url = format!("https://{host}?Action=GetCallerIdentity&Version=2011-06-15");
    let mut headers = HeaderMap::new();
    headers.insert(
        http::header::HOST,
        HeaderValue::from_str(&host)
            .map_err(|e| auth_error(format!("Invalid AWS region `{region}`: {e}")))?,
    );
    headers.insert(
        HeaderName::from_static(GOOG_TARGET_RESOURCE_HEADER),
        HeaderValue::from_str(audience)
            .map_err(|e| auth_error(format!("Invalid workload identity audience: {e}")))?,
    );
    let signed_headers = sign_request(
        "POST",
        &url,
        &headers,
        b"",
        &identity.credentials,
        region,
        "sts",
        PROVIDER_NAME,
    )?;
    let mut token_headers = signed_headers
        .iter()
        .map(|(name, value)| {
            Ok(SubjectTokenHeader {
                key: name.as_str().to_string(),
                value: value
                    .to_str()
                    .map_err(|e| auth_error(format!("Signed header is not valid ASCII: {e}")))?
                    .to_string(),
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;
    token_headers.sort_by(|a, b| a.key.cmp(&b.key));
    let token = serde_json::to_string(&SubjectToken {
        url: &url,
        method: "POST",
        headers: token_headers,
    })
    .map_err(|e| auth_error(format!("Failed to serialize subject token: {e}")))?;
    Ok(urlencoding::encode(&token).into_owned())
}
