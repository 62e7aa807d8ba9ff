//! A client for the identity provider's user and session endpoints
//!
//! Responses are passed through as raw JSON. When the provider answers with
//! an error status, [`ProviderError::Status`] carries that status along with
//! the provider's body so that it can be relayed to the caller unchanged.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(missing_debug_implementations, unused_must_use, unsafe_code)]

use std::time::Duration;

use aliri::JwtRef;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

mod braids;
pub mod dto;

pub use braids::{ApiKey, ApiKeyRef, Password, PasswordRef, RefreshToken, RefreshTokenRef};

/// Upper bound on a single call to the identity provider
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// An error while calling the identity provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered with an error status
    #[error("identity provider responded with {status}")]
    Status {
        /// The provider's status code
        status: StatusCode,
        /// The provider's response body, or `{"message": <text>}` if the body
        /// was not JSON
        detail: Value,
    },
    /// Unable to send the request, or it timed out
    #[error("error sending request to identity provider")]
    RequestSend(#[source] reqwest::Error),
    /// Unable to read the response
    #[error("error reading identity provider response body")]
    BodyRead(#[source] reqwest::Error),
    /// The provider answered successfully but not with JSON
    #[error("error deserializing identity provider response body")]
    BodyDeserialize(#[from] serde_json::Error),
}

/// A client for the identity provider
#[derive(Clone, Debug)]
pub struct ProviderClient {
    client: Client,
    base_url: String,
    api_key: Option<ApiKey>,
}

impl ProviderClient {
    /// Constructs a client for the provider at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, api_key: Option<ApiKey>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("evalgate_provider/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self::with_client(client, base_url, api_key))
    }

    /// Constructs a client using a preconfigured HTTP client
    pub fn with_client(client: Client, base_url: &str, api_key: Option<ApiKey>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    /// The provider's base URL, without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Registers a new user, authorized by the configured API key
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached or rejects the
    /// request.
    pub async fn register_user(&self, user: dto::NewUser) -> Result<Value, ProviderError> {
        let registration = dto::Registration::from(user);
        let req = self.authorized(self.post("/v1/users", &registration), None);
        send(req, "/v1/users").await
    }

    /// Exchanges credentials for tokens
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached or rejects the
    /// request.
    pub async fn login(&self, credentials: &dto::Credentials) -> Result<Value, ProviderError> {
        send(self.post("/v1/auth/login", credentials), "/v1/auth/login").await
    }

    /// Exchanges a refresh token for fresh tokens
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached or rejects the
    /// request.
    pub async fn refresh(&self, body: &dto::RefreshRequest) -> Result<Value, ProviderError> {
        send(self.post("/v1/auth/refresh", body), "/v1/auth/refresh").await
    }

    /// Fetches the provider's view of the bearer of `access_token`
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached or rejects the
    /// request.
    pub async fn me(&self, access_token: &JwtRef) -> Result<Value, ProviderError> {
        let req = self.client.get(self.url("/v1/auth/me"));
        send(self.authorized(req, Some(access_token)), "/v1/auth/me").await
    }

    /// Ends the session identified by the refresh token
    ///
    /// The caller's access token is forwarded if present, otherwise the API key
    /// is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached or rejects the
    /// request.
    pub async fn logout(
        &self,
        body: &dto::RefreshRequest,
        access_token: Option<&JwtRef>,
    ) -> Result<Value, ProviderError> {
        let req = self.authorized(self.post("/v1/auth/logout", body), access_token);
        send(req, "/v1/auth/logout").await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> RequestBuilder {
        self.client.post(self.url(path)).json(body)
    }

    fn authorized(&self, req: RequestBuilder, token: Option<&JwtRef>) -> RequestBuilder {
        match (token, &self.api_key) {
            (Some(token), _) => req.bearer_auth(token.as_str()),
            (None, Some(api_key)) => req.bearer_auth(api_key.as_str()),
            (None, None) => req,
        }
    }
}

#[tracing::instrument(err, skip(req))]
async fn send(req: RequestBuilder, path: &str) -> Result<Value, ProviderError> {
    tracing::trace!("calling identity provider");

    let resp = req.send().await.map_err(ProviderError::RequestSend)?;
    let status = resp.status();

    tracing::debug!(
        response.status = status.as_u16(),
        "received response from identity provider"
    );

    let body = resp.bytes().await.map_err(ProviderError::BodyRead)?;

    if status.is_client_error() || status.is_server_error() {
        let detail = serde_json::from_slice(&body).unwrap_or_else(|_| {
            serde_json::json!({ "message": String::from_utf8_lossy(&body) })
        });
        return Err(ProviderError::Status { status, detail });
    }

    Ok(serde_json::from_slice(&body)?)
}
