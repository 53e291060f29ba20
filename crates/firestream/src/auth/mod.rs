//! Authentication adapters
//!
//! Sign-in tasks become single-result streams; the auth-state listener
//! becomes a continuous stream.

mod backend;
mod observe;
mod types;

pub use backend::{AuthBackend, AuthStateListener, AuthTask};
pub use observe::RxAuth;
pub use types::{AuthCredential, AuthError, AuthResult, User};
