//! In-memory storage client

use std::collections::HashMap;
use std::io::{self, Read};
use std::path::Path;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use super::task::MemoryTask;
use crate::storage::{
    StorageBackend, StorageError, StorageLocation, StorageMetadata, StorageReference,
    UploadSnapshot, UploadState, UploadTask,
};

type MemoryUploadTask = MemoryTask<UploadSnapshot, StorageError>;

/// 256 KiB, the chunk granularity of resumable uploads
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

#[derive(Default)]
struct Bucket {
    objects: Mutex<HashMap<StorageLocation, (Bytes, StorageMetadata)>>,
    last_task: Mutex<Option<Arc<MemoryUploadTask>>>,
}

/// Storage client that keeps objects in a map
///
/// Uploads run when the first listener attaches: one `InProgress` snapshot per
/// chunk, then the `Success` snapshot. In manual mode tasks are left for the
/// caller to drive through [`last_task`](Self::last_task).
pub struct MemoryStorage {
    chunk_size: usize,
    manual: bool,
    bucket: Arc<Bucket>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            manual: false,
            bucket: Arc::new(Bucket::default()),
        }
    }

    pub fn manual() -> Self {
        Self {
            manual: true,
            ..Self::new()
        }
    }

    /// Stored bytes and metadata at `location`
    pub fn object(&self, location: &StorageLocation) -> Option<(Bytes, StorageMetadata)> {
        self.bucket.objects.lock().get(location).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.bucket.objects.lock().len()
    }

    /// Most recently created upload task
    pub fn last_task(&self) -> Option<Arc<MemoryUploadTask>> {
        self.bucket.last_task.lock().clone()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryStorage {
    fn reference(&self, location: &StorageLocation) -> Arc<dyn StorageReference> {
        Arc::new(MemoryReference {
            location: location.clone(),
            chunk_size: self.chunk_size,
            manual: self.manual,
            bucket: Arc::clone(&self.bucket),
        })
    }
}

struct MemoryReference {
    location: StorageLocation,
    chunk_size: usize,
    manual: bool,
    bucket: Arc<Bucket>,
}

impl MemoryReference {
    fn new_task(&self) -> Arc<MemoryUploadTask> {
        let task = Arc::new(
            MemoryUploadTask::new()
                .with_cancel_error(StorageError::new(StorageError::CANCELED, "User canceled the upload")),
        );
        *self.bucket.last_task.lock() = Some(Arc::clone(&task));
        task
    }

    /// Start an upload whose payload is produced when the task begins
    fn upload<F>(&self, known_size: bool, metadata: Option<StorageMetadata>, payload: F) -> Arc<UploadTask>
    where
        F: FnOnce() -> Result<Bytes, StorageError> + Send + 'static,
    {
        let task = self.new_task();
        if self.manual {
            return task;
        }

        let job = UploadJob {
            task: Arc::downgrade(&task),
            location: self.location.clone(),
            chunk_size: self.chunk_size,
            known_size,
            metadata,
            bucket: Arc::clone(&self.bucket),
        };
        task.start_on_first_listener(move || job.run(payload));
        task
    }
}

impl StorageReference for MemoryReference {
    fn location(&self) -> StorageLocation {
        self.location.clone()
    }

    fn put_bytes(&self, data: Bytes, metadata: Option<StorageMetadata>) -> Arc<UploadTask> {
        self.upload(true, metadata, move || Ok(data))
    }

    fn put_stream(
        &self,
        mut stream: Box<dyn Read + Send>,
        metadata: Option<StorageMetadata>,
    ) -> Arc<UploadTask> {
        self.upload(false, metadata, move || {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).map_err(io_error)?;
            Ok(Bytes::from(buf))
        })
    }

    fn put_file(&self, path: &Path, metadata: Option<StorageMetadata>) -> Arc<UploadTask> {
        let path = path.to_path_buf();
        self.upload(true, metadata, move || {
            std::fs::read(&path).map(Bytes::from).map_err(io_error)
        })
    }
}

fn io_error(err: io::Error) -> StorageError {
    let code = match err.kind() {
        io::ErrorKind::NotFound => StorageError::OBJECT_NOT_FOUND,
        io::ErrorKind::PermissionDenied => StorageError::NOT_AUTHORIZED,
        _ => StorageError::UNKNOWN,
    };
    StorageError::new(code, err.to_string())
}

struct UploadJob {
    task: Weak<MemoryUploadTask>,
    location: StorageLocation,
    chunk_size: usize,
    known_size: bool,
    metadata: Option<StorageMetadata>,
    bucket: Arc<Bucket>,
}

impl UploadJob {
    fn run(self, payload: impl FnOnce() -> Result<Bytes, StorageError>) {
        let Some(task) = self.task.upgrade() else {
            return;
        };
        let data = match payload() {
            Ok(data) => data,
            Err(e) => {
                task.fail(e);
                return;
            }
        };

        let total = data.len() as u64;
        let mut sent = 0usize;
        while sent < data.len() && task.is_pending() {
            sent = (sent + self.chunk_size).min(data.len());
            task.progress(UploadSnapshot {
                location: self.location.clone(),
                bytes_transferred: sent as u64,
                total_bytes: self.known_size.then_some(total),
                state: UploadState::InProgress,
                metadata: None,
            });
        }
        if !task.is_pending() {
            return;
        }

        let now = Utc::now();
        let mut stored = self.metadata.unwrap_or_default();
        stored.size_bytes = Some(total);
        stored.updated_at = Some(now);
        {
            let mut objects = self.bucket.objects.lock();
            stored.created_at = objects
                .get(&self.location)
                .and_then(|(_, m)| m.created_at)
                .or(Some(now));
            objects.insert(self.location.clone(), (data, stored.clone()));
        }
        debug!("Memory storage: stored {} ({} bytes)", self.location, total);

        task.succeed(UploadSnapshot {
            location: self.location,
            bytes_transferred: total,
            total_bytes: Some(total),
            state: UploadState::Success,
            metadata: Some(stored),
        });
    }
}
