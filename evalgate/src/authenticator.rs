use aliri::JwtRef;
use aliri_clock::{Clock, System};
use thiserror::Error;

use crate::{
    jwks::{KeySetSource, RemoteKeySet},
    AuthenticatedIdentity, IdentityResolver, ResolveError, TokenVerifier, UserRepository,
    VerifyError,
};

/// Reasons a request could not be authenticated
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// The token was rejected
    #[error(transparent)]
    Verify(#[from] VerifyError),
    /// The verified claims could not be resolved to a local user
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Verifies a bearer token and resolves the caller it identifies
#[derive(Debug, Clone)]
pub struct Authenticator<R, S = RemoteKeySet, C = System> {
    verifier: TokenVerifier<S, C>,
    resolver: IdentityResolver<R>,
}

impl<R, S, C> Authenticator<R, S, C>
where
    R: UserRepository,
    S: KeySetSource,
    C: Clock,
{
    /// Constructs an authenticator
    pub fn new(verifier: TokenVerifier<S, C>, resolver: IdentityResolver<R>) -> Self {
        Self { verifier, resolver }
    }

    /// The token verifier
    pub fn verifier(&self) -> &TokenVerifier<S, C> {
        &self.verifier
    }

    /// The identity resolver
    pub fn resolver(&self) -> &IdentityResolver<R> {
        &self.resolver
    }

    /// Authenticates the bearer of `token`
    ///
    /// # Errors
    ///
    /// Fails if the token does not verify or names no subject, or if the local
    /// user cannot be stored.
    pub async fn authenticate(
        &self,
        token: &JwtRef,
    ) -> Result<AuthenticatedIdentity, AuthenticationError> {
        let claims = self.verifier.verify(token).await?;
        Ok(self.resolver.resolve(claims).await?)
    }
}
