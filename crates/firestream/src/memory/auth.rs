//! In-memory auth client

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::task::MemoryTask;
use crate::auth::{AuthBackend, AuthCredential, AuthError, AuthResult, AuthStateListener, AuthTask, User};
use crate::subscription::ListenerHandle;

type SignInTask = MemoryTask<AuthResult, AuthError>;

#[derive(Default)]
struct AuthState {
    current: Option<User>,
    /// Credential identity -> uid, so repeat sign-ins resolve to the same user
    accounts: HashMap<String, String>,
    listeners: Vec<(ListenerHandle, Arc<dyn AuthStateListener>)>,
    last_task: Option<Arc<SignInTask>>,
}

/// Auth client that signs users in locally
///
/// Credentials with an empty token, email or password are rejected with
/// `ERROR_INVALID_CREDENTIAL`; anything else succeeds. In manual mode sign-in
/// tasks stay pending until completed through [`last_task`](Self::last_task).
/// Either way a successful task becomes the current user before its listeners
/// hear about it.
pub struct MemoryAuth {
    manual: bool,
    state: Arc<Mutex<AuthState>>,
    next_id: AtomicU64,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self {
            manual: false,
            state: Arc::new(Mutex::new(AuthState::default())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn manual() -> Self {
        Self {
            manual: true,
            ..Self::new()
        }
    }

    /// Most recent sign-in task
    pub fn last_task(&self) -> Option<Arc<SignInTask>> {
        self.state.lock().last_task.clone()
    }

    pub fn state_listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    fn next_number(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn start(&self, outcome: Result<AuthResult, AuthError>) -> Arc<AuthTask> {
        let task = Arc::new(SignInTask::new());
        self.state.lock().last_task = Some(Arc::clone(&task));

        let state = Arc::clone(&self.state);
        task.before_success(move |result| {
            debug!("Memory auth: signed in {}", result.user.uid);
            set_current(&state, Some(result.user.clone()));
        });

        if !self.manual {
            match outcome {
                Ok(result) => task.succeed(result),
                Err(error) => task.fail(error),
            }
        }
        task
    }

    fn resolve(&self, credential: &AuthCredential) -> Result<AuthResult, AuthError> {
        let (identity, email) = match credential {
            AuthCredential::Google {
                id_token,
                access_token,
            } => (
                id_token
                    .as_ref()
                    .or(access_token.as_ref())
                    .cloned()
                    .unwrap_or_default(),
                None,
            ),
            AuthCredential::Facebook { access_token } => (access_token.clone(), None),
            AuthCredential::Github { token } => (token.clone(), None),
            AuthCredential::Twitter { token, secret } => {
                if secret.is_empty() {
                    (String::new(), None)
                } else {
                    (token.clone(), None)
                }
            }
            AuthCredential::EmailPassword { email, password } => {
                if password.is_empty() {
                    (String::new(), None)
                } else {
                    (email.clone(), Some(email.clone()))
                }
            }
            AuthCredential::CustomToken { token } => (token.clone(), None),
        };

        if identity.is_empty() {
            return Err(AuthError::new(
                "ERROR_INVALID_CREDENTIAL",
                format!("The supplied {} credential is malformed", credential.provider_id()),
            ));
        }

        let provider_id = credential.provider_id();
        let key = format!("{}:{}", provider_id, identity);
        let (uid, is_new_user) = {
            let mut st = self.state.lock();
            match st.accounts.get(&key) {
                Some(uid) => (uid.clone(), false),
                None => {
                    let uid = format!("user-{}", self.next_number());
                    st.accounts.insert(key, uid.clone());
                    (uid, true)
                }
            }
        };

        Ok(AuthResult {
            user: User {
                uid,
                email,
                display_name: None,
                provider_id: provider_id.to_string(),
                is_anonymous: false,
            },
            is_new_user,
        })
    }
}

fn set_current(state: &Mutex<AuthState>, user: Option<User>) {
    let listeners: Vec<_> = {
        let mut st = state.lock();
        st.current = user.clone();
        st.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
    };
    for listener in listeners {
        listener.on_auth_state_changed(user.clone());
    }
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthBackend for MemoryAuth {
    fn sign_in_with_credential(&self, credential: AuthCredential) -> Arc<AuthTask> {
        let outcome = self.resolve(&credential);
        self.start(outcome)
    }

    fn sign_in_anonymously(&self) -> Arc<AuthTask> {
        let user = User {
            uid: format!("anon-{}", self.next_number()),
            email: None,
            display_name: None,
            provider_id: "anonymous".to_string(),
            is_anonymous: true,
        };
        self.start(Ok(AuthResult {
            user,
            is_new_user: true,
        }))
    }

    fn current_user(&self) -> Option<User> {
        self.state.lock().current.clone()
    }

    fn sign_out(&self) {
        set_current(&self.state, None);
    }

    fn add_auth_state_listener(&self, listener: Arc<dyn AuthStateListener>) -> ListenerHandle {
        let handle = ListenerHandle(self.next_number());
        let current = {
            let mut st = self.state.lock();
            st.listeners.push((handle, Arc::clone(&listener)));
            st.current.clone()
        };
        listener.on_auth_state_changed(current);
        handle
    }

    fn remove_auth_state_listener(&self, handle: ListenerHandle) {
        self.state.lock().listeners.retain(|(h, _)| *h != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Uids(Mutex<Vec<Option<String>>>);

    impl AuthStateListener for Uids {
        fn on_auth_state_changed(&self, user: Option<User>) {
            self.0.lock().push(user.map(|u| u.uid));
        }
    }

    #[test]
    fn test_same_credential_same_user() {
        let auth = MemoryAuth::new();
        let cred = AuthCredential::EmailPassword {
            email: "ada@example.com".into(),
            password: "hunter2".into(),
        };
        let first = auth.resolve(&cred).unwrap();
        let second = auth.resolve(&cred).unwrap();

        assert_eq!(first.user.uid, second.user.uid);
        assert!(first.is_new_user);
        assert!(!second.is_new_user);
        assert_eq!(first.user.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn test_empty_secrets_rejected() {
        let auth = MemoryAuth::new();
        for cred in [
            AuthCredential::Google {
                id_token: None,
                access_token: None,
            },
            AuthCredential::Twitter {
                token: "t".into(),
                secret: String::new(),
            },
            AuthCredential::EmailPassword {
                email: "a@b.c".into(),
                password: String::new(),
            },
        ] {
            assert_eq!(auth.resolve(&cred).unwrap_err().code, "ERROR_INVALID_CREDENTIAL");
        }
    }

    #[test]
    fn test_manual_mode_leaves_task_pending() {
        let auth = MemoryAuth::manual();
        auth.sign_in_anonymously();
        let task = auth.last_task().unwrap();
        assert!(task.is_pending());
        assert!(auth.current_user().is_none());
    }

    #[test]
    fn test_manual_success_sets_current_user() {
        let auth = MemoryAuth::manual();
        let seen = Arc::new(Uids::default());
        auth.add_auth_state_listener(seen.clone());

        auth.sign_in_anonymously();
        let user = User {
            uid: "manual-1".into(),
            email: None,
            display_name: None,
            provider_id: "anonymous".into(),
            is_anonymous: true,
        };
        auth.last_task().unwrap().succeed(AuthResult {
            user: user.clone(),
            is_new_user: true,
        });

        assert_eq!(auth.current_user(), Some(user));
        assert_eq!(*seen.0.lock(), vec![None, Some("manual-1".to_string())]);
    }
}
