//! A time-bounded cache over the identity provider's published signing keys
//!
//! The cache starts empty and is populated the first time a token needs
//! verifying. A fetched key set is trusted for [`KEY_SET_TTL`]; after that,
//! the next caller refetches it and the whole set is replaced in a single
//! atomic swap. Readers never see a partially replaced set. Concurrent callers
//! that find the set stale may each fetch it; the last one to finish wins.
//!
//! If a fetch fails, the cached set is left as it was and the error is
//! returned to the caller.

use std::{fmt, sync::Arc, time::Duration};

use aliri::{jwk, Jwk, Jwks};
use aliri_clock::{Clock, System, UnixTime};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

/// How long a fetched key set is trusted
pub const KEY_SET_TTL: Duration = Duration::from_secs(300);

/// Upper bound on a single key set fetch
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// An error encountered while fetching the key set
#[derive(Debug, Error)]
pub enum KeyFetchError {
    /// The request could not be sent, or timed out
    #[error("error sending JWKS request")]
    RequestSend(#[source] reqwest::Error),
    /// The key set endpoint responded with a non-success status
    #[error("JWKS endpoint responded with an unexpected status")]
    UnexpectedStatus(#[source] reqwest::Error),
    /// The response body could not be read
    #[error("error reading JWKS response body")]
    BodyRead(#[source] reqwest::Error),
    /// The response was not a key set document
    #[error("JWKS document is malformed")]
    Malformed(#[from] serde_json::Error),
}

/// A source from which the current key set can be fetched
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetches the current key set
    async fn fetch(&self) -> Result<Jwks, KeyFetchError>;
}

#[async_trait]
impl<T: KeySetSource + ?Sized> KeySetSource for Arc<T> {
    async fn fetch(&self) -> Result<Jwks, KeyFetchError> {
        (**self).fetch().await
    }
}

/// A key set published at a remote URL
#[derive(Clone, Debug)]
pub struct RemoteKeySet {
    client: Client,
    jwks_url: String,
}

impl RemoteKeySet {
    /// Constructs a source for the key set at `jwks_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(jwks_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("evalgate/", env!("CARGO_PKG_VERSION")))
            .timeout(FETCH_TIMEOUT)
            .build()?;

        Ok(Self::with_client(client, jwks_url))
    }

    /// Constructs a source using a preconfigured client
    ///
    /// The client should carry its own timeout.
    pub fn with_client(client: Client, jwks_url: impl Into<String>) -> Self {
        Self {
            client,
            jwks_url: jwks_url.into(),
        }
    }

    /// The URL the key set is fetched from
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}

#[async_trait]
impl KeySetSource for RemoteKeySet {
    #[tracing::instrument(skip(self), fields(jwks.url = %self.jwks_url))]
    async fn fetch(&self) -> Result<Jwks, KeyFetchError> {
        tracing::debug!("fetching JWKS");

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|err| {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, "JWKS fetch failed; unable to reach endpoint");
                KeyFetchError::RequestSend(err)
            })?;

        if let Err(err) = response.error_for_status_ref() {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(
                error,
                http.status_code = response.status().as_u16(),
                "JWKS fetch failed; unexpected response status",
            );
            return Err(KeyFetchError::UnexpectedStatus(err));
        }

        let body = response.bytes().await.map_err(KeyFetchError::BodyRead)?;

        parse_key_set(&body).map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, "JWKS fetch failed; malformed document");
            err
        })
    }
}

/// Parses a key set document
///
/// The document may either be an object with a `keys` array or the bare array
/// itself. Keys that cannot be interpreted are skipped.
///
/// # Errors
///
/// Returns an error if the document is neither shape.
pub fn parse_key_set(document: &[u8]) -> Result<Jwks, KeyFetchError> {
    let is_bare_array = document
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'[');

    if is_bare_array {
        let mut wrapped = Vec::with_capacity(document.len() + 9);
        wrapped.extend_from_slice(br#"{"keys":"#);
        wrapped.extend_from_slice(document);
        wrapped.push(b'}');
        Ok(serde_json::from_slice(&wrapped)?)
    } else {
        Ok(serde_json::from_slice(document)?)
    }
}

/// An immutable view of the key set as of a particular fetch
#[derive(Debug)]
pub struct KeySnapshot {
    keys: Jwks,
    expires_at: UnixTime,
}

impl KeySnapshot {
    fn empty() -> Self {
        Self {
            keys: Jwks::default(),
            expires_at: UnixTime(0),
        }
    }

    /// The signing keys in this snapshot
    pub fn keys(&self) -> &[Jwk] {
        self.keys.keys()
    }

    /// Finds the key with the given identifier
    pub fn find(&self, kid: &jwk::KeyIdRef) -> Option<&Jwk> {
        self.keys.keys().iter().find(|k| k.key_id() == Some(kid))
    }

    /// The time after which this snapshot will no longer be served
    pub fn expires_at(&self) -> UnixTime {
        self.expires_at
    }

    fn is_fresh(&self, now: UnixTime) -> bool {
        !self.keys.keys().is_empty() && self.expires_at > now
    }
}

struct Inner<S, C> {
    snapshot: ArcSwap<KeySnapshot>,
    source: S,
    clock: C,
}

/// A shared, time-bounded cache of signing keys
///
/// Clones share the same underlying cache.
#[must_use]
pub struct KeySetCache<S = RemoteKeySet, C = System> {
    inner: Arc<Inner<S, C>>,
}

impl<S, C> Clone for KeySetCache<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: fmt::Debug, C: fmt::Debug> fmt::Debug for KeySetCache<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.inner.snapshot.load();
        f.debug_struct("KeySetCache")
            .field("source", &self.inner.source)
            .field("clock", &self.inner.clock)
            .field("key_count", &snapshot.keys().len())
            .field("expires_at", &snapshot.expires_at)
            .finish()
    }
}

impl<S: KeySetSource> KeySetCache<S, System> {
    /// Constructs an empty cache over `source` using the system clock
    pub fn new(source: S) -> Self {
        Self::with_clock(source, System)
    }
}

impl<S: KeySetSource, C: Clock> KeySetCache<S, C> {
    /// Constructs an empty cache over `source` using the given clock
    pub fn with_clock(source: S, clock: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                snapshot: ArcSwap::from_pointee(KeySnapshot::empty()),
                source,
                clock,
            }),
        }
    }

    /// The clock used to judge freshness
    pub fn clock(&self) -> &C {
        &self.inner.clock
    }

    /// Returns the current signing keys, fetching them if the cache is empty
    /// or stale
    ///
    /// # Errors
    ///
    /// Returns an error if a fetch was needed and failed. The cache is not
    /// modified in that case.
    pub async fn get_signing_keys(&self) -> Result<Arc<KeySnapshot>, KeyFetchError> {
        let now = self.inner.clock.now();

        let current = self.inner.snapshot.load_full();
        if current.is_fresh(now) {
            return Ok(current);
        }

        let keys = self.inner.source.fetch().await?;
        let snapshot = Arc::new(KeySnapshot {
            keys,
            expires_at: UnixTime(now.0 + KEY_SET_TTL.as_secs()),
        });

        self.inner.snapshot.store(Arc::clone(&snapshot));
        tracing::info!(
            key_count = snapshot.keys().len(),
            expires_at = snapshot.expires_at.0,
            "JWKS refreshed"
        );

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tracing_test::traced_test;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::test_support::{hmac_key, CountingSource, SharedClock};

    #[tokio::test]
    async fn first_call_fetches_and_caches() {
        let source = Arc::new(CountingSource::new(vec![hmac_key("k1", b"secret")]));
        let cache = KeySetCache::with_clock(Arc::clone(&source), SharedClock::at(1_000));

        let snapshot = cache.get_signing_keys().await.unwrap();
        assert_eq!(snapshot.keys().len(), 1);
        assert_eq!(snapshot.expires_at(), UnixTime(1_300));

        cache.get_signing_keys().await.unwrap();
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn still_fresh_at_299_seconds() {
        let clock = SharedClock::at(1_000);
        let source = Arc::new(CountingSource::new(vec![hmac_key("k1", b"secret")]));
        let cache = KeySetCache::with_clock(Arc::clone(&source), clock.clone());

        cache.get_signing_keys().await.unwrap();
        clock.advance(299);
        cache.get_signing_keys().await.unwrap();

        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn refetches_at_301_seconds() {
        let clock = SharedClock::at(1_000);
        let source = Arc::new(CountingSource::new(vec![hmac_key("k1", b"secret")]));
        let cache = KeySetCache::with_clock(Arc::clone(&source), clock.clone());

        cache.get_signing_keys().await.unwrap();
        clock.advance(301);
        let snapshot = cache.get_signing_keys().await.unwrap();

        assert_eq!(source.fetches(), 2);
        assert_eq!(snapshot.expires_at(), UnixTime(1_601));
    }

    #[tokio::test]
    async fn empty_key_set_is_never_fresh() {
        let source = Arc::new(CountingSource::new(Vec::new()));
        let cache = KeySetCache::with_clock(Arc::clone(&source), SharedClock::at(1_000));

        cache.get_signing_keys().await.unwrap();
        cache.get_signing_keys().await.unwrap();

        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_leaves_previous_keys_in_place() {
        let clock = SharedClock::at(1_000);
        let source = Arc::new(CountingSource::new(vec![hmac_key("k1", b"secret")]));
        let cache = KeySetCache::with_clock(Arc::clone(&source), clock.clone());

        let before = cache.get_signing_keys().await.unwrap();

        clock.advance(400);
        source.fail_next();
        assert!(cache.get_signing_keys().await.is_err());

        let retained = cache.inner.snapshot.load_full();
        assert!(Arc::ptr_eq(&before, &retained));
    }

    #[test]
    fn finds_keys_by_identifier() {
        let mut keys = Jwks::default();
        keys.add_key(hmac_key("k1", b"one"));
        keys.add_key(hmac_key("k2", b"two"));
        let snapshot = KeySnapshot {
            keys,
            expires_at: UnixTime(0),
        };

        let found = snapshot.find(jwk::KeyIdRef::from_str("k2")).unwrap();
        assert_eq!(found.key_id().map(|k| k.as_str()), Some("k2"));
        assert!(snapshot.find(jwk::KeyIdRef::from_str("k3")).is_none());
    }

    #[test]
    fn parses_bare_key_array() {
        let document = json!([
            { "kty": "oct", "kid": "k1", "alg": "HS256", "k": "c2VjcmV0" }
        ]);

        let jwks = parse_key_set(document.to_string().as_bytes()).unwrap();

        assert_eq!(jwks.keys().len(), 1);
    }

    #[test]
    fn skips_keys_it_cannot_interpret() {
        let document = json!({
            "keys": [
                { "kty": "oct", "kid": "k1", "alg": "HS256", "k": "c2VjcmV0" },
                { "kty": "mystery", "kid": "k2" }
            ]
        });

        let jwks = parse_key_set(document.to_string().as_bytes()).unwrap();

        assert_eq!(jwks.keys().len(), 1);
    }

    #[test]
    fn rejects_documents_without_keys() {
        assert!(parse_key_set(br#"{"issuer":"nope"}"#).is_err());
        assert!(parse_key_set(b"not json").is_err());
    }

    #[tokio::test]
    async fn remote_source_accepts_keys_object() -> color_eyre::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [{ "kty": "oct", "kid": "k1", "alg": "HS256", "k": "c2VjcmV0" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = RemoteKeySet::new(format!("{}/v1/.well-known/jwks.json", server.uri()))?;
        let jwks = source.fetch().await?;

        assert_eq!(jwks.keys().len(), 1);
        assert_eq!(
            jwks.keys()[0].key_id().map(|k| k.as_str()),
            Some("k1")
        );
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn remote_source_reports_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = RemoteKeySet::new(format!("{}/jwks", server.uri())).unwrap();
        let cache = KeySetCache::with_clock(source, SharedClock::at(1_000));

        let err = cache.get_signing_keys().await.unwrap_err();

        assert!(matches!(err, KeyFetchError::UnexpectedStatus(_)));
        assert!(cache.inner.snapshot.load().keys().is_empty());
        assert!(logs_contain("unexpected response status"));
    }

    #[tokio::test]
    async fn remote_source_rejects_non_json_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let source = RemoteKeySet::new(format!("{}/jwks", server.uri())).unwrap();

        assert!(matches!(
            source.fetch().await,
            Err(KeyFetchError::Malformed(_))
        ));
    }
}
