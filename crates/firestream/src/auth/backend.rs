//! Interface of the wrapped auth client

use std::sync::Arc;

use super::types::{AuthCredential, AuthError, AuthResult, User};
use crate::subscription::ListenerHandle;
use crate::task::Task;

/// Sign-in task as returned by the auth client
pub type AuthTask = dyn Task<AuthResult, AuthError>;

/// Notified with the current user whenever sign-in state changes
pub trait AuthStateListener: Send + Sync {
    fn on_auth_state_changed(&self, user: Option<User>);
}

pub trait AuthBackend: Send + Sync {
    fn sign_in_with_credential(&self, credential: AuthCredential) -> Arc<AuthTask>;
    fn sign_in_anonymously(&self) -> Arc<AuthTask>;
    fn current_user(&self) -> Option<User>;
    fn sign_out(&self);

    /// The listener is told the current state as soon as it is added
    fn add_auth_state_listener(&self, listener: Arc<dyn AuthStateListener>) -> ListenerHandle;
    fn remove_auth_state_listener(&self, handle: ListenerHandle);
}
