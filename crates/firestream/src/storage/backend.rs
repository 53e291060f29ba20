//! Interface of the wrapped storage client

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use super::types::{StorageError, StorageLocation, StorageMetadata, UploadSnapshot};
use crate::task::Task;

/// Upload task as returned by the storage client
pub type UploadTask = dyn Task<UploadSnapshot, StorageError>;

pub trait StorageBackend: Send + Sync {
    fn reference(&self, location: &StorageLocation) -> Arc<dyn StorageReference>;
}

/// One object in a bucket. Uploads start as soon as the task is created.
pub trait StorageReference: Send + Sync {
    fn location(&self) -> StorageLocation;

    fn put_bytes(&self, data: Bytes, metadata: Option<StorageMetadata>) -> Arc<UploadTask>;

    /// The client takes ownership of the reader and consumes it
    fn put_stream(
        &self,
        stream: Box<dyn Read + Send>,
        metadata: Option<StorageMetadata>,
    ) -> Arc<UploadTask>;

    /// The client reads the file itself
    fn put_file(&self, path: &Path, metadata: Option<StorageMetadata>) -> Arc<UploadTask>;
}
