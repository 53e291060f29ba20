//! Stream-terminal errors
//!
//! Every failure callback from the wrapped client ends its stream with one of
//! these. Codes and messages are carried through untouched.

use thiserror::Error;

use crate::auth::AuthError;
use crate::database::DatabaseError;
use crate::storage::StorageError;

/// Terminal error delivered by an [`Observation`](crate::Observation)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FirestreamError {
    /// A database listener was cancelled by the service
    #[error("database error {code}: {message}")]
    Database { code: i32, message: String },

    /// A sign-in task failed
    #[error("authentication failed: {0}")]
    Auth(AuthError),

    /// An upload task failed
    #[error("upload failed: {0}")]
    Storage(StorageError),

    /// The upload target could not be resolved to a bucket and object path
    #[error("invalid storage url '{url}': {reason}")]
    InvalidStorageUrl { url: String, reason: String },
}

impl FirestreamError {
    /// Numeric service code, when the failure came from a service that has one
    pub fn code(&self) -> Option<i32> {
        match self {
            FirestreamError::Database { code, .. } => Some(*code),
            FirestreamError::Storage(err) => Some(err.code),
            FirestreamError::Auth(_) | FirestreamError::InvalidStorageUrl { .. } => None,
        }
    }
}

/// The message is the client message, then a single space and the details
/// when there are any. The client itself concatenates them with no separator.
impl From<DatabaseError> for FirestreamError {
    fn from(error: DatabaseError) -> Self {
        let message = if error.details.is_empty() {
            error.message
        } else {
            format!("{} {}", error.message, error.details)
        };
        FirestreamError::Database {
            code: error.code,
            message,
        }
    }
}

impl From<AuthError> for FirestreamError {
    fn from(error: AuthError) -> Self {
        FirestreamError::Auth(error)
    }
}

impl From<StorageError> for FirestreamError {
    fn from(error: StorageError) -> Self {
        FirestreamError::Storage(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_keeps_code_and_joins_details() {
        let err: FirestreamError = DatabaseError::new(
            DatabaseError::PERMISSION_DENIED,
            "Permission denied",
            "rules rejected read at /users",
        )
        .into();

        assert_eq!(err.code(), Some(-3));
        assert_eq!(
            err,
            FirestreamError::Database {
                code: -3,
                message: "Permission denied rules rejected read at /users".to_string(),
            }
        );
    }

    #[test]
    fn test_database_error_without_details() {
        let err: FirestreamError =
            DatabaseError::new(DatabaseError::DISCONNECTED, "Disconnected", "").into();
        assert_eq!(err.to_string(), "database error -4: Disconnected");
    }

    #[test]
    fn test_storage_and_auth_codes() {
        let storage: FirestreamError =
            StorageError::new(StorageError::QUOTA_EXCEEDED, "quota exceeded").into();
        assert_eq!(storage.code(), Some(-13013));

        let auth: FirestreamError =
            AuthError::new("ERROR_INVALID_CREDENTIAL", "bad token").into();
        assert_eq!(auth.code(), None);
        assert!(auth.to_string().contains("ERROR_INVALID_CREDENTIAL"));
    }
}
