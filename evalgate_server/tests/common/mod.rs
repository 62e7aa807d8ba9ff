#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use aliri::{jwa, jwk, jwt, Jwk, Jwks, Jwt};
use aliri_base64::Base64UrlRef;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use evalgate::{
    memory::InMemoryUserRepository, Authenticator, IdentityResolver, KeyFetchError, KeySetCache,
    KeySetSource, TokenVerifier,
};
use evalgate_axum::SharedAuthenticator;
use evalgate_provider::{ApiKey, ProviderClient};
use evalgate_server::{evaluations::InMemoryEvaluationRepository, router, AppState};
use serde_json::Value;
use tower::ServiceExt;

pub const KEY_ID: &str = "test key";
const SHARED_SECRET: &[u8] = b"integration secret";

pub fn key() -> Jwk {
    let secret = Base64UrlRef::from_slice(SHARED_SECRET).to_owned();
    Jwk::from(jwa::Hmac::new(secret))
        .with_algorithm(jwa::Algorithm::HS256)
        .with_key_id(jwk::KeyId::from_static(KEY_ID))
}

pub fn token(claims: Value) -> Jwt {
    let headers =
        jwt::BasicHeaders::with_key_id(jwa::Algorithm::HS256, jwk::KeyId::from_static(KEY_ID));
    Jwt::try_from_parts_with_signature(&headers, &claims, &key()).unwrap()
}

pub fn user_token(sub: &str) -> Jwt {
    token(serde_json::json!({ "sub": sub, "preferred_username": sub, "roles": ["user"] }))
}

pub fn admin_token(sub: &str) -> Jwt {
    token(serde_json::json!({ "sub": sub, "roles": "admin" }))
}

/// Serves the test key, or fails while `down` is set
#[derive(Debug, Default)]
pub struct TestKeys {
    pub down: AtomicBool,
}

#[async_trait]
impl KeySetSource for TestKeys {
    async fn fetch(&self) -> Result<Jwks, KeyFetchError> {
        if self.down.load(Ordering::SeqCst) {
            let err = serde_json::from_str::<Value>("<html>").unwrap_err();
            return Err(KeyFetchError::Malformed(err));
        }

        let mut jwks = Jwks::default();
        jwks.add_key(key());
        Ok(jwks)
    }
}

pub struct TestApp {
    pub router: Router,
    pub keys: Arc<TestKeys>,
}

impl TestApp {
    /// An app whose identity provider lives at `provider_url`
    pub fn new(provider_url: &str) -> Self {
        let keys = Arc::new(TestKeys::default());
        let authenticator = Authenticator::new(
            TokenVerifier::new(KeySetCache::new(keys.clone())),
            IdentityResolver::new(InMemoryUserRepository::new()),
        );
        let provider =
            ProviderClient::new(provider_url, Some(ApiKey::from_static("sk_test"))).unwrap();

        let state = AppState::new(
            SharedAuthenticator::new(authenticator),
            Arc::new(InMemoryEvaluationRepository::new()),
            provider,
            "Evaluations API",
        );

        Self {
            router: router(state),
            keys,
        }
    }

    /// An app whose identity provider cannot be reached
    pub fn offline() -> Self {
        Self::new("http://127.0.0.1:9")
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&Jwt>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token.as_str()));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = self.router.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, body)
    }
}
