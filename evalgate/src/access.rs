//! Role-based access decisions over an authenticated caller
//!
//! Admin membership is an exact, case-sensitive match on the `admin` role.

use aliri_traits::Policy;
use thiserror::Error;

use crate::{roles::ADMIN_ROLE, AuthenticatedIdentity, UserIdRef};

/// Indicates the caller may not perform the requested action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Forbidden {
    /// The action is reserved for admins
    #[error("Admin role required")]
    AdminRequired,
    /// The resource belongs to someone else
    #[error("Forbidden")]
    NotOwner,
}

/// Whether the caller holds the admin role
pub fn is_admin(identity: &AuthenticatedIdentity) -> bool {
    identity.roles.iter().any(|r| r == ADMIN_ROLE)
}

/// Allows only admins
///
/// # Errors
///
/// Returns [`Forbidden::AdminRequired`] if the caller is not an admin.
pub fn require_admin(identity: &AuthenticatedIdentity) -> Result<(), Forbidden> {
    AdminOnly.evaluate(identity)
}

/// Allows admins and the owner of the resource
///
/// # Errors
///
/// Returns [`Forbidden::NotOwner`] if the caller is neither.
pub fn authorize_owner_or_admin(
    identity: &AuthenticatedIdentity,
    owner_id: &UserIdRef,
) -> Result<(), Forbidden> {
    OwnerOrAdmin::new(owner_id).evaluate(identity)
}

/// A policy admitting only admins
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdminOnly;

impl Policy for AdminOnly {
    type Request = AuthenticatedIdentity;
    type Denial = Forbidden;

    fn evaluate(&self, held: &Self::Request) -> Result<(), Self::Denial> {
        if is_admin(held) {
            Ok(())
        } else {
            Err(Forbidden::AdminRequired)
        }
    }
}

/// A policy admitting admins and the owner of one particular resource
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OwnerOrAdmin<'a> {
    owner_id: &'a UserIdRef,
}

impl<'a> OwnerOrAdmin<'a> {
    /// Constructs a policy for a resource owned by `owner_id`
    pub fn new(owner_id: &'a UserIdRef) -> Self {
        Self { owner_id }
    }
}

impl Policy for OwnerOrAdmin<'_> {
    type Request = AuthenticatedIdentity;
    type Denial = Forbidden;

    fn evaluate(&self, held: &Self::Request) -> Result<(), Self::Denial> {
        if is_admin(held) || held.user.id.as_str() == self.owner_id.as_str() {
            Ok(())
        } else {
            Err(Forbidden::NotOwner)
        }
    }
}
