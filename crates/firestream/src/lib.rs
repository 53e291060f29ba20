//! Stream adapters for realtime database, auth and storage clients
//!
//! Each callback API of the wrapped client becomes an [`Observation`], a
//! [`futures::Stream`] of `Result<T, FirestreamError>`:
//! - `database` - value, single-value and child listeners
//! - `auth` - credential and anonymous sign-in, auth state
//! - `storage` - byte, stream and file uploads with progress
//!
//! Creating an observation registers exactly one listener with the client.
//! Dropping it (or calling [`Subscription::unsubscribe`]) removes that same
//! listener, once. Failure callbacks end the stream with a single error.
//!
//! `memory` has in-process clients for tests and offline use.

pub mod app;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod memory;
pub mod storage;
pub mod subscription;
pub mod task;

pub use app::Firestream;
pub use config::{FirestreamConfig, StorageConfig};
pub use error::FirestreamError;
pub use subscription::{DetachCause, ListenerHandle, Observation, Subscription};
pub use task::{Task, TaskListener};
