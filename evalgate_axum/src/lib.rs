//! Axum extractors that authenticate requests with `evalgate`
//!
//! Place a [`SharedAuthenticator`] in your router state (or make it reachable
//! through [`FromRef`]) and then take [`Authenticated`] or [`AdminOnly`] as a
//! handler argument.
//!
//! ```no_run
//! use axum::{extract::FromRef, routing::get, Router};
//! use evalgate::{
//!     memory::InMemoryUserRepository, Authenticator, IdentityResolver, KeySetCache,
//!     RemoteKeySet, TokenVerifier,
//! };
//! use evalgate_axum::{AdminOnly, Authenticated, SharedAuthenticator};
//!
//! #[derive(Clone, FromRef)]
//! struct AppState {
//!     auth: SharedAuthenticator,
//! }
//!
//! async fn whoami(Authenticated { identity, .. }: Authenticated) -> String {
//!     format!("hello, {}", identity.user.username)
//! }
//!
//! async fn admin_only(_: AdminOnly) -> &'static str {
//!     "welcome, admin"
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source = RemoteKeySet::new("https://auth.example.com/v1/.well-known/jwks.json")?;
//! let authenticator = Authenticator::new(
//!     TokenVerifier::new(KeySetCache::new(source)),
//!     IdentityResolver::new(InMemoryUserRepository::default()),
//! );
//!
//! let app: Router = Router::new()
//!     .route("/whoami", get(whoami))
//!     .route("/admin", get(admin_only))
//!     .with_state(AppState {
//!         auth: SharedAuthenticator::new(authenticator),
//!     });
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(missing_debug_implementations, unused_must_use)]
#![forbid(unsafe_code)]

use std::{error::Error, fmt, sync::Arc};

use aliri::{Jwt, JwtRef};
use aliri_clock::Clock;
use async_trait::async_trait;
use axum_core::{
    extract::{FromRef, FromRequestParts},
    response::{IntoResponse, Response},
};
use evalgate::{
    access::{self, Forbidden},
    AuthenticatedIdentity, AuthenticationError, Authenticator, KeySetSource, ResolveError,
    UserRepository, VerifyError,
};
use http::{header, request::Parts, StatusCode};

pub mod util;

/// Anything able to authenticate a bearer token
#[async_trait]
pub trait Authenticate: Send + Sync {
    /// Authenticates the bearer of `token`
    async fn authenticate(&self, token: &JwtRef)
        -> Result<AuthenticatedIdentity, AuthenticationError>;
}

#[async_trait]
impl<R, S, C> Authenticate for Authenticator<R, S, C>
where
    R: UserRepository,
    S: KeySetSource,
    C: Clock + Send + Sync,
{
    async fn authenticate(
        &self,
        token: &JwtRef,
    ) -> Result<AuthenticatedIdentity, AuthenticationError> {
        Authenticator::authenticate(self, token).await
    }
}

/// A type-erased, cloneable handle to an authenticator
#[derive(Clone)]
pub struct SharedAuthenticator(Arc<dyn Authenticate>);

impl SharedAuthenticator {
    /// Wraps an authenticator
    pub fn new<A: Authenticate + 'static>(authenticator: A) -> Self {
        Self(Arc::new(authenticator))
    }

    /// Authenticates the bearer of `token`
    ///
    /// # Errors
    ///
    /// Returns the reason the token was not accepted.
    pub async fn authenticate(
        &self,
        token: &JwtRef,
    ) -> Result<AuthenticatedIdentity, AuthenticationError> {
        self.0.authenticate(token).await
    }
}

impl fmt::Debug for SharedAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedAuthenticator")
    }
}

/// An error indicating that the request could not be authenticated or
/// authorized
#[derive(Debug)]
#[non_exhaustive]
pub enum AuthFailed {
    /// No bearer token was presented
    MissingToken,

    /// The token was presented but not accepted
    InvalidToken(AuthenticationError),

    /// The signing keys could not be obtained, so no token can be verified
    KeysUnavailable(AuthenticationError),

    /// The caller could not be shadowed locally
    Internal(AuthenticationError),

    /// The caller is authenticated but may not perform this action
    Forbidden(Forbidden),
}

impl From<AuthenticationError> for AuthFailed {
    fn from(err: AuthenticationError) -> Self {
        match &err {
            AuthenticationError::Verify(VerifyError::KeyFetch(_)) => Self::KeysUnavailable(err),
            AuthenticationError::Resolve(ResolveError::Repository(_)) => Self::Internal(err),
            _ => Self::InvalidToken(err),
        }
    }
}

impl From<Forbidden> for AuthFailed {
    fn from(err: Forbidden) -> Self {
        Self::Forbidden(err)
    }
}

impl fmt::Display for AuthFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => f.write_str("authorization token is missing or malformed"),
            Self::InvalidToken(err) | Self::KeysUnavailable(err) | Self::Internal(err) => {
                fmt::Display::fmt(err, f)
            }
            Self::Forbidden(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl Error for AuthFailed {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MissingToken => None,
            Self::InvalidToken(err) | Self::KeysUnavailable(err) | Self::Internal(err) => {
                Some(err)
            }
            Self::Forbidden(err) => Some(err),
        }
    }
}

impl IntoResponse for AuthFailed {
    fn into_response(self) -> Response {
        match self {
            Self::MissingToken | Self::InvalidToken(_) => {
                tracing::debug!(error = %self, "request authentication failed");
                util::unauthorized()
            }
            Self::KeysUnavailable(err) => {
                let error: &dyn Error = &err;
                tracing::warn!(error, "request authentication failed; signing keys unavailable");
                util::detail(StatusCode::SERVICE_UNAVAILABLE, "Unable to fetch JWKS")
            }
            Self::Internal(err) => {
                let error: &dyn Error = &err;
                tracing::error!(error, "request authentication failed; unable to shadow user");
                util::detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            Self::Forbidden(err) => {
                tracing::debug!(error = %err, "request authorization failed");
                util::forbidden(&err.to_string())
            }
        }
    }
}

/// Extracts the bearer token from an `Authorization` header value
///
/// The scheme is matched case-insensitively.
pub fn extract_jwt(auth: &str) -> Option<Jwt> {
    let scheme = auth.get(..7)?;
    if !scheme.eq_ignore_ascii_case("bearer ") {
        return None;
    }

    let token = auth.get(7..)?.trim();
    if token.is_empty() {
        return None;
    }

    Some(Jwt::from(token))
}

fn bearer_token(parts: &Parts) -> Option<Jwt> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_jwt)
}

/// The bearer token on the request, if any, without verifying it
#[derive(Debug, Clone)]
pub struct BearerToken(pub Option<Jwt>);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(bearer_token(parts)))
    }
}

/// An authenticated caller
#[derive(Debug, Clone)]
pub struct Authenticated {
    /// The caller
    pub identity: AuthenticatedIdentity,
    /// The token the caller presented
    pub token: Jwt,
}

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    SharedAuthenticator: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthFailed;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthFailed::MissingToken)?;
        let authenticator = SharedAuthenticator::from_ref(state);
        let identity = authenticator.authenticate(&token).await?;

        Ok(Self { identity, token })
    }
}

/// An authenticated caller holding the admin role
#[derive(Debug, Clone)]
pub struct AdminOnly(pub Authenticated);

#[async_trait]
impl<S> FromRequestParts<S> for AdminOnly
where
    SharedAuthenticator: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthFailed;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authenticated = Authenticated::from_request_parts(parts, state).await?;
        access::require_admin(&authenticated.identity)?;

        Ok(Self(authenticated))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use aliri::{jwa, jwk, jwt, Jwk, Jwks};
    use aliri_base64::Base64UrlRef;
    use axum::{body::Body, extract::FromRef, http::Request, routing::get, Router};
    use color_eyre::Result;
    use evalgate::{
        memory::InMemoryUserRepository, IdentityResolver, KeyFetchError, KeySetCache,
        TokenVerifier,
    };
    use tower::ServiceExt;

    use super::*;

    const KEY_ID: &str = "test key";
    const SHARED_SECRET: &[u8] = b"test";

    fn key() -> Jwk {
        let secret = Base64UrlRef::from_slice(SHARED_SECRET).to_owned();
        Jwk::from(jwa::Hmac::new(secret))
            .with_algorithm(jwa::Algorithm::HS256)
            .with_key_id(jwk::KeyId::from_static(KEY_ID))
    }

    #[derive(Debug, Default)]
    struct StaticKeys {
        fail: bool,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl KeySetSource for StaticKeys {
        async fn fetch(&self) -> Result<Jwks, KeyFetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                let err = serde_json::from_str::<serde_json::Value>("").unwrap_err();
                return Err(KeyFetchError::Malformed(err));
            }
            let mut jwks = Jwks::default();
            jwks.add_key(key());
            Ok(jwks)
        }
    }

    #[derive(Clone, FromRef)]
    struct AppState {
        auth: SharedAuthenticator,
    }

    fn app(keys: StaticKeys) -> Router {
        let authenticator = Authenticator::new(
            TokenVerifier::new(KeySetCache::new(keys)),
            IdentityResolver::new(InMemoryUserRepository::default()),
        );

        Router::new()
            .route(
                "/whoami",
                get(|Authenticated { identity, .. }: Authenticated| async move {
                    identity.user.id.to_string()
                }),
            )
            .route("/admin", get(|_: AdminOnly| async { "ok" }))
            .route(
                "/peek",
                get(|BearerToken(token): BearerToken| async move {
                    token.is_some().to_string()
                }),
            )
            .with_state(AppState {
                auth: SharedAuthenticator::new(authenticator),
            })
    }

    fn token(claims: serde_json::Value) -> Jwt {
        let headers =
            jwt::BasicHeaders::with_key_id(jwa::Algorithm::HS256, jwk::KeyId::from_static(KEY_ID));
        Jwt::try_from_parts_with_signature(&headers, &claims, &key()).unwrap()
    }

    fn request(uri: &str, authorization: Option<String>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(auth) = authorization {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert!(extract_jwt("Bearer abc").is_some());
        assert!(extract_jwt("bEaReR abc").is_some());
        assert!(extract_jwt("Basic abc").is_none());
        assert!(extract_jwt("Bearer ").is_none());
        assert!(extract_jwt("Bearer    ").is_none());
    }

    #[test]
    fn multibyte_header_values_are_rejected() {
        assert!(extract_jwt("Bearer€abc").is_none());
        assert!(extract_jwt("B€").is_none());
        assert!(extract_jwt("Bearer€").is_none());
        assert!(extract_jwt("Bearer €").is_some());
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() -> Result<()> {
        let resp = app(StaticKeys::default())
            .oneshot(request("/whoami", None))
            .await?;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
        assert_eq!(body_string(resp).await, r#"{"detail":"Unauthorized"}"#);
        Ok(())
    }

    #[tokio::test]
    async fn valid_token_reaches_handler() -> Result<()> {
        let jwt = token(serde_json::json!({ "sub": "u1" }));

        let resp = app(StaticKeys::default())
            .oneshot(request("/whoami", Some(format!("Bearer {}", jwt.as_str()))))
            .await?;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "u1");
        Ok(())
    }

    #[tokio::test]
    async fn rejection_reason_is_not_disclosed() -> Result<()> {
        let jwt = token(serde_json::json!({ "sub": "u1", "exp": 1 }));

        let resp = app(StaticKeys::default())
            .oneshot(request("/whoami", Some(format!("Bearer {}", jwt.as_str()))))
            .await?;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_string(resp).await, r#"{"detail":"Unauthorized"}"#);
        Ok(())
    }

    #[tokio::test]
    async fn unavailable_keys_are_service_unavailable() -> Result<()> {
        let jwt = token(serde_json::json!({ "sub": "u1" }));
        let keys = StaticKeys {
            fail: true,
            ..StaticKeys::default()
        };

        let resp = app(keys)
            .oneshot(request("/whoami", Some(format!("Bearer {}", jwt.as_str()))))
            .await?;

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_string(resp).await, r#"{"detail":"Unable to fetch JWKS"}"#);
        Ok(())
    }

    #[tokio::test]
    async fn non_admin_is_forbidden_from_admin_routes() -> Result<()> {
        let jwt = token(serde_json::json!({ "sub": "u1", "roles": ["user"] }));

        let resp = app(StaticKeys::default())
            .oneshot(request("/admin", Some(format!("Bearer {}", jwt.as_str()))))
            .await?;

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_string(resp).await, r#"{"detail":"Admin role required"}"#);
        Ok(())
    }

    #[tokio::test]
    async fn admin_reaches_admin_routes() -> Result<()> {
        let jwt = token(serde_json::json!({ "sub": "root", "roles": "admin" }));

        let resp = app(StaticKeys::default())
            .oneshot(request("/admin", Some(format!("Bearer {}", jwt.as_str()))))
            .await?;

        assert_eq!(resp.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn bearer_token_is_optional() -> Result<()> {
        let resp = app(StaticKeys::default())
            .oneshot(request("/peek", None))
            .await?;
        assert_eq!(body_string(resp).await, "false");

        let resp = app(StaticKeys::default())
            .oneshot(request("/peek", Some("Bearer not-checked".to_owned())))
            .await?;
        assert_eq!(body_string(resp).await, "true");
        Ok(())
    }
}
