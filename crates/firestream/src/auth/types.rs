//! Authentication types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider credential exchanged for a signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum AuthCredential {
    Google {
        id_token: Option<String>,
        access_token: Option<String>,
    },
    Facebook {
        access_token: String,
    },
    Github {
        token: String,
    },
    Twitter {
        token: String,
        secret: String,
    },
    EmailPassword {
        email: String,
        password: String,
    },
    CustomToken {
        token: String,
    },
}

impl AuthCredential {
    /// Provider id as the auth service names it
    pub fn provider_id(&self) -> &'static str {
        match self {
            AuthCredential::Google { .. } => "google.com",
            AuthCredential::Facebook { .. } => "facebook.com",
            AuthCredential::Github { .. } => "github.com",
            AuthCredential::Twitter { .. } => "twitter.com",
            AuthCredential::EmailPassword { .. } => "password",
            AuthCredential::CustomToken { .. } => "custom",
        }
    }
}

/// Signed-in user profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    pub provider_id: String,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Outcome of a successful sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    pub user: User,
    /// First sign-in for this account
    #[serde(default)]
    pub is_new_user: bool,
}

/// Failure reported by a sign-in task
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct AuthError {
    /// Service error code, e.g. `ERROR_INVALID_CREDENTIAL`
    pub code: String,
    pub message: String,
}

impl AuthError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
