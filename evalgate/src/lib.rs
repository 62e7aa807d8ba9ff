//! Bearer token authentication against a remotely published JSON Web Key Set
//!
//! The pieces compose from the bottom up:
//!
//! * [`KeySetCache`] holds the identity provider's signing keys, refetching
//!   them once they are older than five minutes.
//! * [`TokenVerifier`] checks a token's signature against those keys along with
//!   its expiry, audience, and issuer, yielding the raw [`TokenClaims`].
//! * [`IdentityResolver`] shadows the token subject into a [`LocalUser`],
//!   creating it on first sight and refreshing it on every later sign-in.
//! * The [`access`] module decides whether an [`AuthenticatedIdentity`] may act
//!   on a resource.
//!
//! [`Authenticator`] bundles the verifier and resolver for use by request
//! handlers.
//!
//! ```no_run
//! use aliri::JwtRef;
//! use evalgate::{
//!     memory::InMemoryUserRepository, Authenticator, IdentityResolver, KeySetCache,
//!     RemoteKeySet, TokenVerifier,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source = RemoteKeySet::new("https://auth.example.com/v1/.well-known/jwks.json")?;
//! let verifier = TokenVerifier::new(KeySetCache::new(source))
//!     .with_audience(aliri::jwt::Audience::from_static("evaluations"));
//! let resolver = IdentityResolver::new(InMemoryUserRepository::default());
//! let authenticator = Authenticator::new(verifier, resolver);
//!
//! let identity = authenticator
//!     .authenticate(JwtRef::from_str("eyJhbGciOi..."))
//!     .await?;
//! println!("hello, {}", identity.user.username);
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(missing_debug_implementations, unused_must_use, unsafe_code)]

pub mod access;
mod authenticator;
mod claims;
mod identity;
pub mod jwks;
pub mod memory;
pub mod roles;
mod verifier;

pub use authenticator::{AuthenticationError, Authenticator};
pub use claims::{RoleClaim, TokenClaims};
pub use identity::{
    AuthenticatedIdentity, IdentityResolver, LocalUser, RepositoryError, ResolveError, UserId,
    UserIdRef, UserRepository,
};
pub use jwks::{KeyFetchError, KeySetCache, KeySetSource, KeySnapshot, RemoteKeySet};
pub use verifier::{TokenVerifier, VerifyError};

#[cfg(test)]
pub(crate) mod test_support;
