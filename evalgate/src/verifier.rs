use aliri::{
    jws::Verifier,
    jwt::{self, CoreHeaders, HasAlgorithm},
    JwtRef,
};
use aliri_base64::Base64Url;
use aliri_clock::{Clock, System};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    jwks::{KeyFetchError, KeySetCache, KeySetSource, RemoteKeySet},
    TokenClaims,
};

/// Reasons a bearer token was not accepted
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The token is not a well-formed JWT or its header could not be read
    #[error("malformed token header")]
    MalformedHeader(#[source] aliri::error::JwtVerifyError),
    /// No trusted key matches the token's key ID
    #[error("no matching key found to validate JWT")]
    UnknownKey,
    /// The signature does not verify against the matching key
    #[error("invalid token signature")]
    BadSignature(#[source] aliri::error::JwkVerifyError),
    /// The signed payload is not a usable claim set
    #[error("malformed token claims: {0}")]
    MalformedClaims(&'static str),
    /// The token expired
    #[error("token expired")]
    Expired,
    /// The token was issued for some other audience
    #[error("invalid audience")]
    InvalidAudience,
    /// The token was issued by an untrusted issuer
    #[error("invalid issuer")]
    InvalidIssuer,
    /// The signing keys could not be obtained
    #[error("unable to fetch signing keys")]
    KeyFetch(#[from] KeyFetchError),
}

/// Verifies bearer tokens against the cached key set
#[derive(Debug, Clone)]
pub struct TokenVerifier<S = RemoteKeySet, C = System> {
    keys: KeySetCache<S, C>,
    audience: Option<jwt::Audience>,
    issuer: Option<jwt::Issuer>,
}

impl<S, C> TokenVerifier<S, C>
where
    S: KeySetSource,
    C: Clock,
{
    /// Constructs a verifier that checks neither audience nor issuer
    pub fn new(keys: KeySetCache<S, C>) -> Self {
        Self {
            keys,
            audience: None,
            issuer: None,
        }
    }

    /// Requires the `aud` claim to equal `audience`
    pub fn with_audience(mut self, audience: jwt::Audience) -> Self {
        self.audience = Some(audience);
        self
    }

    /// Requires the `iss` claim to equal `issuer`
    pub fn with_issuer(mut self, issuer: jwt::Issuer) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// The key set cache backing this verifier
    pub fn key_set(&self) -> &KeySetCache<S, C> {
        &self.keys
    }

    /// Verifies a token, returning its claims
    ///
    /// Checks run in order and stop at the first failure: header, key lookup,
    /// signature, expiry, audience, then issuer. A token without an `exp`
    /// claim does not expire.
    ///
    /// # Errors
    ///
    /// Returns the first check that failed.
    pub async fn verify(&self, token: &JwtRef) -> Result<TokenClaims, VerifyError> {
        let result = self.verify_inner(token).await;
        if let Err(error) = &result {
            tracing::debug!(%error, "JWT validation failed");
        }
        result
    }

    async fn verify_inner(&self, token: &JwtRef) -> Result<TokenClaims, VerifyError> {
        let decomposed: jwt::Decomposed<jwt::BasicHeaders> =
            token.decompose().map_err(VerifyError::MalformedHeader)?;

        let kid = decomposed.kid().ok_or(VerifyError::UnknownKey)?;

        let key_set = self.keys.get_signing_keys().await?;
        let key = key_set.find(kid).ok_or_else(|| {
            tracing::debug!(%kid, "unable to find matching key");
            VerifyError::UnknownKey
        })?;

        let alg = key.algorithm().unwrap_or_else(|| decomposed.alg());
        key.verify(
            alg,
            decomposed.untrusted_message().as_bytes(),
            decomposed.signature().as_slice(),
        )
        .map_err(VerifyError::BadSignature)?;

        let raw = Base64Url::from_encoded(decomposed.untrusted_payload())
            .map_err(|_| VerifyError::MalformedClaims("payload is not base64url"))?;
        let claims: Map<String, Value> = serde_json::from_slice(raw.as_slice())
            .map_err(|_| VerifyError::MalformedClaims("payload is not a JSON object"))?;
        let claims = TokenClaims::new(claims);

        if let Some(exp) = claims.get("exp") {
            let exp = exp
                .as_f64()
                .ok_or(VerifyError::MalformedClaims("exp is not numeric"))?;
            let now = self.keys.clock().now();
            if (now.0 as f64) > exp {
                return Err(VerifyError::Expired);
            }
        }

        if let Some(audience) = &self.audience {
            if claims.get("aud").and_then(Value::as_str) != Some(audience.as_str()) {
                return Err(VerifyError::InvalidAudience);
            }
        }

        if let Some(issuer) = &self.issuer {
            if claims.get("iss").and_then(Value::as_str) != Some(issuer.as_str()) {
                return Err(VerifyError::InvalidIssuer);
            }
        }

        Ok(claims)
    }
}
