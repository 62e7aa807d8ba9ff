use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The decoded payload of a verified bearer token
///
/// All claims are retained so that handlers can inspect anything the
/// identity provider chose to include. Accessors are provided for the claims
/// this crate interprets.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenClaims(Map<String, Value>);

/// Claim names consulted for roles, in order of preference
const ROLE_CLAIMS: [&str; 3] = ["roles", "role", "authorities"];

impl TokenClaims {
    /// Wraps an already decoded claim set
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    /// Looks up a claim by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The subject (`sub`) of the token
    ///
    /// Numeric subjects are rendered as strings. An empty subject is
    /// treated as absent.
    pub fn subject(&self) -> Option<String> {
        match self.0.get("sub")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The `preferred_username` claim, if it is a non-empty string
    pub fn preferred_username(&self) -> Option<&str> {
        self.non_empty_str("preferred_username")
    }

    /// The `email` claim, if it is a non-empty string
    pub fn email(&self) -> Option<&str> {
        self.non_empty_str("email")
    }

    /// The display `name` claim, if it is a non-empty string
    pub fn name(&self) -> Option<&str> {
        self.non_empty_str("name")
    }

    /// The roles carried by the token
    ///
    /// The first of `roles`, `role`, or `authorities` that holds a value is
    /// used; empty strings, empty lists, and nulls defer to the next name.
    pub fn roles(&self) -> RoleClaim {
        ROLE_CLAIMS
            .iter()
            .filter_map(|name| self.0.get(*name))
            .find(|v| is_present(v))
            .map_or(RoleClaim::Absent, RoleClaim::from_value)
    }

    /// The underlying claim map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the claims, returning the underlying map
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    fn non_empty_str(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

impl From<Map<String, Value>> for TokenClaims {
    fn from(claims: Map<String, Value>) -> Self {
        Self(claims)
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// The shape in which a token expressed its roles
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RoleClaim {
    /// No role claim was present, or it could not be read as roles
    #[default]
    Absent,
    /// A single role given as a bare string
    Single(String),
    /// A list of roles
    List(Vec<String>),
}

impl RoleClaim {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::String(role) => Self::Single(role.clone()),
            Value::Array(items) => Self::List(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToOwned::to_owned)
                    .collect(),
            ),
            _ => Self::Absent,
        }
    }

    /// Flattens the claim into a list of roles
    pub fn into_roles(self) -> Vec<String> {
        match self {
            Self::Absent => Vec::new(),
            Self::Single(role) => vec![role],
            Self::List(roles) => roles,
        }
    }
}
