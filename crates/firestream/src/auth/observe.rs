//! Sign-in tasks and auth state as streams

use std::sync::Arc;

use tracing::{debug, info};

use super::backend::{AuthBackend, AuthStateListener};
use super::types::{AuthCredential, AuthResult, User};
use crate::subscription::{Emitter, Observation, Registration};
use crate::task::observe_task;

struct AuthStateForwarder {
    emitter: Arc<Emitter<Option<User>>>,
}

impl AuthStateListener for AuthStateForwarder {
    fn on_auth_state_changed(&self, user: Option<User>) {
        self.emitter.next(user);
    }
}

/// Stream adapters over an auth client
#[derive(Clone)]
pub struct RxAuth {
    backend: Arc<dyn AuthBackend>,
}

impl RxAuth {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self { backend }
    }

    /// Sign in with a provider credential. Emits one result, then completes.
    pub fn sign_in_with_credential(&self, credential: AuthCredential) -> Observation<AuthResult> {
        info!("Signing in with {} credential", credential.provider_id());
        observe_task(
            "sign_in_with_credential",
            self.backend.sign_in_with_credential(credential),
            false,
        )
    }

    /// Sign in as a fresh anonymous user. Emits one result, then completes.
    pub fn sign_in_anonymously(&self) -> Observation<AuthResult> {
        info!("Signing in anonymously");
        observe_task("sign_in_anonymously", self.backend.sign_in_anonymously(), false)
    }

    /// Stream the signed-in user, starting with the current one. `None`
    /// means signed out. Never completes on its own.
    pub fn observe_auth_state(&self) -> Observation<Option<User>> {
        Observation::attach("auth_state", |emitter| {
            let handle = self
                .backend
                .add_auth_state_listener(Arc::new(AuthStateForwarder { emitter }));
            debug!("auth_state: registered {}", handle);
            let backend = Arc::clone(&self.backend);
            Registration::new("auth_state", move |_| {
                backend.remove_auth_state_listener(handle)
            })
        })
    }

    pub fn current_user(&self) -> Option<User> {
        self.backend.current_user()
    }

    pub fn sign_out(&self) {
        info!("Signing out");
        self.backend.sign_out();
    }
}
