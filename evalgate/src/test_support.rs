use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use aliri::{jwa, jwk, jwt, Jwk, Jwks, Jwt};
use aliri_base64::Base64UrlRef;
use aliri_clock::{Clock, UnixTime};
use async_trait::async_trait;

use crate::jwks::{KeyFetchError, KeySetSource};

pub fn hmac_key(kid: &str, secret: &[u8]) -> Jwk {
    Jwk::from(jwa::Hmac::new(Base64UrlRef::from_slice(secret).to_owned()))
        .with_algorithm(jwa::Algorithm::HS256)
        .with_key_id(jwk::KeyId::from(kid.to_owned()))
}

pub fn sign(key: &Jwk, kid: &str, payload: &serde_json::Value) -> Jwt {
    let headers = jwt::BasicHeaders::with_key_id(jwa::Algorithm::HS256, kid.to_owned());
    Jwt::try_from_parts_with_signature(&headers, payload, key).unwrap()
}

/// A clock whose time can be advanced after it has been handed out
#[derive(Clone, Debug)]
pub struct SharedClock(Arc<AtomicU64>);

impl SharedClock {
    pub fn at(secs: u64) -> Self {
        Self(Arc::new(AtomicU64::new(secs)))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for SharedClock {
    fn now(&self) -> UnixTime {
        UnixTime(self.0.load(Ordering::SeqCst))
    }
}

/// Serves a fixed key set and counts how often it was asked
#[derive(Debug)]
pub struct CountingSource {
    keys: Vec<Jwk>,
    fetches: AtomicUsize,
    fail_next: AtomicBool,
}

impl CountingSource {
    pub fn new(keys: Vec<Jwk>) -> Self {
        Self {
            keys,
            fetches: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeySetSource for CountingSource {
    async fn fetch(&self) -> Result<Jwks, KeyFetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.fail_next.swap(false, Ordering::SeqCst) {
            let truncated = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
            return Err(KeyFetchError::Malformed(truncated));
        }

        let mut jwks = Jwks::default();
        for key in &self.keys {
            jwks.add_key(key.clone());
        }
        Ok(jwks)
    }
}
