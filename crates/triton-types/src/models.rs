use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a user proves who they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    OAuth,
    Anonymous,
}

impl AuthType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthType::OAuth => "oauth",
            AuthType::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oauth" => Ok(AuthType::OAuth),
            "anonymous" => Ok(AuthType::Anonymous),
            other => Err(format!("unknown auth type: {other}")),
        }
    }
}

/// A stored user. `oauth_id` is set exactly when `auth_type` is `OAuth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub auth_type: AuthType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth_id: Option<String>,
}

/// Who is making the current request.
///
/// Produced by the authentication middleware and stored as a request
/// extension. Requests without an `Authorization` header are `Anonymous`;
/// handlers that need a real account match on `User`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    User(User),
}

impl Identity {
    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
        }
    }
}
