//! In-memory clients
//!
//! Local implementations of the database, auth and storage interfaces. They
//! deliver callbacks synchronously on the calling thread and expose listener
//! bookkeeping (active and removed handles, cancel counts) so tests can check
//! that every stream cleans up after itself.

mod auth;
mod query;
mod storage;
mod task;

pub use auth::MemoryAuth;
pub use query::MemoryQuery;
pub use storage::{MemoryStorage, DEFAULT_CHUNK_SIZE};
pub use task::MemoryTask;
