//! Request bodies exchanged with the identity provider

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Password, RefreshToken};

/// The role given to newly registered users who request none
pub const DEFAULT_ROLE: &str = "user";

/// A request to register a new user
#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    /// The username to register
    pub username: String,
    /// The user's password
    pub password: Password,
    /// The user's display name
    #[serde(default)]
    pub full_name: Option<String>,
    /// Roles to grant
    #[serde(default)]
    pub roles: Vec<String>,
    /// Arbitrary metadata to attach to the user
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// A user registration in the shape the identity provider expects
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Registration {
    username: String,
    password: Password,
    roles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Map<String, Value>>,
}

impl From<NewUser> for Registration {
    fn from(user: NewUser) -> Self {
        let roles = if user.roles.is_empty() {
            vec![DEFAULT_ROLE.to_owned()]
        } else {
            user.roles
        };

        let mut metadata = user.metadata.unwrap_or_default();
        if let Some(full_name) = user.full_name.filter(|n| !n.is_empty()) {
            metadata.insert("full_name".to_owned(), Value::String(full_name));
        }

        Self {
            username: user.username,
            password: user.password,
            roles,
            metadata: (!metadata.is_empty()).then_some(metadata),
        }
    }
}

/// Username and password credentials
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credentials {
    /// The username
    pub username: String,
    /// The password
    pub password: Password,
}

/// A request carrying a refresh token, used to refresh or end a session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshRequest {
    /// The refresh token
    pub refresh_token: RefreshToken,
}
