//! Object storage adapters
//!
//! Byte, stream and file uploads become progress streams that end with the
//! final snapshot.

mod backend;
mod observe;
mod types;

pub use backend::{StorageBackend, StorageReference, UploadTask};
pub use observe::RxStorage;
pub use types::{StorageError, StorageLocation, StorageMetadata, UploadSnapshot, UploadState};
