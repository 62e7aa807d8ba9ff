use std::sync::Arc;

use aliri_braid::braid;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::{
    roles::{join_roles, parse_roles},
    TokenClaims,
};

/// The identifier of a local user, equal to the token subject
#[braid(serde)]
pub struct UserId;

/// A locally persisted shadow of an identity provider user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    /// The token subject
    pub id: UserId,
    /// The preferred username, email, or a name derived from the subject
    pub username: String,
    /// The display name, if the token carried one
    pub full_name: Option<String>,
    /// Roles from the most recent token, comma-joined
    pub roles: String,
    /// When this user first authenticated
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When this user last authenticated
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl LocalUser {
    /// The stored roles as a list
    pub fn role_list(&self) -> Vec<String> {
        parse_roles(&self.roles)
    }
}

/// A caller whose token has been verified and shadowed locally
#[derive(Clone, Debug, PartialEq)]
pub struct AuthenticatedIdentity {
    /// The local shadow of the caller
    pub user: LocalUser,
    /// The caller's roles, as of this token
    pub roles: Vec<String>,
    /// Every claim carried by the token
    pub claims: TokenClaims,
}

/// A failure in the user store
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A user with this ID already exists
    #[error("user {0} already exists")]
    Conflict(UserId),
    /// No user with this ID exists
    #[error("user {0} does not exist")]
    NotFound(UserId),
    /// The store could not service the request
    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for local users
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Looks up a user
    async fn find_by_id(&self, id: &UserIdRef) -> Result<Option<LocalUser>, RepositoryError>;

    /// Stores a new user
    ///
    /// Fails with [`RepositoryError::Conflict`] if the ID is taken.
    async fn insert(&self, user: LocalUser) -> Result<LocalUser, RepositoryError>;

    /// Replaces an existing user
    ///
    /// Fails with [`RepositoryError::NotFound`] if there is no such user.
    async fn update(&self, user: LocalUser) -> Result<LocalUser, RepositoryError>;
}

#[async_trait]
impl<T: UserRepository + ?Sized> UserRepository for Arc<T> {
    async fn find_by_id(&self, id: &UserIdRef) -> Result<Option<LocalUser>, RepositoryError> {
        (**self).find_by_id(id).await
    }

    async fn insert(&self, user: LocalUser) -> Result<LocalUser, RepositoryError> {
        (**self).insert(user).await
    }

    async fn update(&self, user: LocalUser) -> Result<LocalUser, RepositoryError> {
        (**self).update(user).await
    }
}

/// Reasons verified claims could not be resolved to a local user
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The token has no usable `sub` claim
    #[error("token carries no subject")]
    MissingSubject,
    /// The user store failed
    #[error("unable to shadow user")]
    Repository(#[from] RepositoryError),
}

/// Maps verified claims onto local users
#[derive(Debug, Clone)]
pub struct IdentityResolver<R> {
    users: R,
}

struct Profile {
    username: String,
    full_name: Option<String>,
    roles: String,
}

impl Profile {
    fn apply(self, mut user: LocalUser, now: OffsetDateTime) -> LocalUser {
        user.username = self.username;
        user.full_name = self.full_name;
        user.roles = self.roles;
        user.updated_at = now;
        user
    }
}

impl<R: UserRepository> IdentityResolver<R> {
    /// Constructs a resolver over a user store
    pub fn new(users: R) -> Self {
        Self { users }
    }

    /// The user store
    pub fn users(&self) -> &R {
        &self.users
    }

    /// Resolves claims into an identity, creating or refreshing the local user
    ///
    /// The local user always reflects the latest claims for its subject.
    ///
    /// # Errors
    ///
    /// Fails if the claims carry no subject or the user store fails.
    #[tracing::instrument(skip_all, fields(user.id = tracing::field::Empty))]
    pub async fn resolve(
        &self,
        claims: TokenClaims,
    ) -> Result<AuthenticatedIdentity, ResolveError> {
        let id = UserId::new(claims.subject().ok_or(ResolveError::MissingSubject)?);
        tracing::Span::current().record("user.id", id.as_str());

        let username = claims
            .preferred_username()
            .or_else(|| claims.email())
            .map_or_else(|| format!("user_{id}"), ToOwned::to_owned);
        let roles = claims.roles().into_roles();
        let profile = Profile {
            username,
            full_name: claims.name().map(ToOwned::to_owned),
            roles: join_roles(&roles),
        };

        let now = OffsetDateTime::now_utc();
        let user = match self.users.find_by_id(&id).await? {
            Some(existing) => self.users.update(profile.apply(existing, now)).await?,
            None => self.create(id, profile, now).await?,
        };

        Ok(AuthenticatedIdentity {
            user,
            roles,
            claims,
        })
    }

    async fn create(
        &self,
        id: UserId,
        profile: Profile,
        now: OffsetDateTime,
    ) -> Result<LocalUser, RepositoryError> {
        let user = LocalUser {
            id: id.clone(),
            username: profile.username.clone(),
            full_name: profile.full_name.clone(),
            roles: profile.roles.clone(),
            created_at: now,
            updated_at: now,
        };

        match self.users.insert(user).await {
            Ok(user) => {
                tracing::info!("local user created");
                Ok(user)
            }
            Err(RepositoryError::Conflict(_)) => {
                tracing::debug!("user created concurrently; refreshing instead");
                let existing = self
                    .users
                    .find_by_id(&id)
                    .await?
                    .ok_or(RepositoryError::NotFound(id))?;
                self.users.update(profile.apply(existing, now)).await
            }
            Err(err) => Err(err),
        }
    }
}
