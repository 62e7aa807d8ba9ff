use std::{fmt, sync::Arc};

use aliri::jwt;
use axum::extract::FromRef;
use evalgate::{
    memory::InMemoryUserRepository, Authenticator, IdentityResolver, KeySetCache, RemoteKeySet,
    TokenVerifier,
};
use evalgate_axum::SharedAuthenticator;
use evalgate_provider::{ApiKey, ProviderClient};

use crate::{
    evaluations::{EvaluationRepository, InMemoryEvaluationRepository},
    Config,
};

/// Shared handles available to every request handler
#[derive(Clone, FromRef)]
pub struct AppState {
    /// Authenticates bearer tokens
    pub auth: SharedAuthenticator,
    /// Stores evaluations
    pub evaluations: Arc<dyn EvaluationRepository>,
    /// Talks to the identity provider
    pub provider: ProviderClient,
    /// The service name reported by the health check
    pub app_name: Arc<str>,
}

impl AppState {
    /// Wires up the service from its configuration, keeping users and
    /// evaluations in memory
    ///
    /// No network calls are made until the first request.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let keys = KeySetCache::new(RemoteKeySet::new(config.jwks_url())?);

        let mut verifier = TokenVerifier::new(keys);
        if let Some(audience) = config.jwt_audience.clone().filter(|a| !a.is_empty()) {
            verifier = verifier.with_audience(jwt::Audience::from(audience));
        }
        if let Some(issuer) = config.jwt_issuer.clone().filter(|i| !i.is_empty()) {
            verifier = verifier.with_issuer(jwt::Issuer::from(issuer));
        }

        let authenticator = Authenticator::new(
            verifier,
            IdentityResolver::new(InMemoryUserRepository::new()),
        );

        let api_key = config
            .snapauth_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .map(ApiKey::from);
        let provider = ProviderClient::new(&config.snapauth_base_url, api_key)?;

        Ok(Self::new(
            SharedAuthenticator::new(authenticator),
            Arc::new(InMemoryEvaluationRepository::new()),
            provider,
            &config.app_name,
        ))
    }

    /// Assembles state from preconstructed parts
    pub fn new(
        auth: SharedAuthenticator,
        evaluations: Arc<dyn EvaluationRepository>,
        provider: ProviderClient,
        app_name: &str,
    ) -> Self {
        Self {
            auth,
            evaluations,
            provider,
            app_name: Arc::from(app_name),
        }
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("auth", &self.auth)
            .field("provider", &self.provider)
            .field("app_name", &self.app_name)
            .finish_non_exhaustive()
    }
}
