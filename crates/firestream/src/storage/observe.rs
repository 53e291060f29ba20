//! Upload tasks as streams

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use super::backend::{StorageBackend, StorageReference, UploadTask};
use super::types::{StorageLocation, StorageMetadata, UploadSnapshot};
use crate::config::StorageConfig;
use crate::error::FirestreamError;
use crate::subscription::Observation;
use crate::task::observe_task;

/// Stream adapters over a storage client
///
/// Every upload stream emits each progress snapshot, then the final snapshot,
/// then completes.
#[derive(Clone)]
pub struct RxStorage {
    backend: Arc<dyn StorageBackend>,
    config: StorageConfig,
}

impl RxStorage {
    pub fn new(backend: Arc<dyn StorageBackend>, config: StorageConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Resolve `url` against the configured default bucket
    pub fn location(&self, url: &str) -> Result<StorageLocation, FirestreamError> {
        StorageLocation::parse(url, self.config.bucket.as_deref()).map_err(|reason| {
            FirestreamError::InvalidStorageUrl {
                url: url.to_string(),
                reason,
            }
        })
    }

    pub fn upload_bytes(
        &self,
        url: &str,
        data: impl Into<Bytes>,
        metadata: Option<StorageMetadata>,
    ) -> Observation<UploadSnapshot> {
        let data = data.into();
        self.upload("upload_bytes", url, move |reference| {
            info!("Uploading {} bytes to {}", data.len(), reference.location());
            reference.put_bytes(data, metadata)
        })
    }

    pub fn upload_stream(
        &self,
        url: &str,
        stream: impl Read + Send + 'static,
        metadata: Option<StorageMetadata>,
    ) -> Observation<UploadSnapshot> {
        self.upload("upload_stream", url, move |reference| {
            info!("Uploading stream to {}", reference.location());
            reference.put_stream(Box::new(stream), metadata)
        })
    }

    pub fn upload_file(
        &self,
        url: &str,
        path: impl AsRef<Path>,
        metadata: Option<StorageMetadata>,
    ) -> Observation<UploadSnapshot> {
        self.upload("upload_file", url, move |reference| {
            info!(
                "Uploading file {} to {}",
                path.as_ref().display(),
                reference.location()
            );
            reference.put_file(path.as_ref(), metadata)
        })
    }

    fn upload<F>(&self, label: &'static str, url: &str, start: F) -> Observation<UploadSnapshot>
    where
        F: FnOnce(&dyn StorageReference) -> Arc<UploadTask>,
    {
        let location = match self.location(url) {
            Ok(location) => location,
            Err(e) => {
                warn!("{}: {}", label, e);
                return Observation::failed(label, e);
            }
        };
        let reference = self.backend.reference(&location);
        let task = start(reference.as_ref());
        observe_task(label, task, self.config.cancel_on_unsubscribe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use crate::storage::{StorageError, UploadState};
    use futures::{FutureExt, StreamExt};
    use std::io::Write;

    fn config(bucket: &str) -> StorageConfig {
        StorageConfig {
            bucket: Some(bucket.to_string()),
            cancel_on_unsubscribe: false,
        }
    }

    async fn drain(stream: Observation<UploadSnapshot>) -> Vec<Result<UploadSnapshot, FirestreamError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_upload_bytes_reports_progress_then_success() {
        let storage = Arc::new(MemoryStorage::with_chunk_size(4));
        let rx = RxStorage::new(storage.clone(), config("b"));

        let events = drain(rx.upload_bytes("docs/a.txt", &b"0123456789"[..], None)).await;
        let snaps: Vec<UploadSnapshot> = events.into_iter().map(|e| e.unwrap()).collect();

        let transferred: Vec<u64> = snaps.iter().map(|s| s.bytes_transferred).collect();
        assert_eq!(transferred, vec![4, 8, 10, 10]);
        assert!(snaps[..3].iter().all(|s| s.state == UploadState::InProgress));
        let last = snaps.last().unwrap();
        assert!(last.is_complete());
        assert_eq!(last.location, StorageLocation::new("b", "docs/a.txt"));
        assert_eq!(
            storage.object(&last.location).map(|(data, _)| data),
            Some(Bytes::from_static(b"0123456789"))
        );
    }

    #[tokio::test]
    async fn test_upload_with_metadata() {
        let storage = Arc::new(MemoryStorage::new());
        let rx = RxStorage::new(storage.clone(), config("b"));
        let meta = StorageMetadata::default().with_content_type("text/plain");

        let events = drain(rx.upload_bytes("gs://other/x.txt", "hi", Some(meta))).await;
        let last = events.last().unwrap().as_ref().unwrap();
        assert_eq!(last.location.bucket, "other");
        let stored = last.metadata.as_ref().unwrap();
        assert_eq!(stored.content_type.as_deref(), Some("text/plain"));
        assert_eq!(stored.size_bytes, Some(2));
    }

    #[tokio::test]
    async fn test_upload_stream() {
        let storage = Arc::new(MemoryStorage::new());
        let rx = RxStorage::new(storage.clone(), config("b"));

        let events = drain(rx.upload_stream("s.bin", std::io::Cursor::new(vec![7u8; 32]), None)).await;
        let last = events.last().unwrap().as_ref().unwrap();
        assert_eq!(last.total_bytes, Some(32));
        assert_eq!(storage.object_count(), 1);
    }

    #[tokio::test]
    async fn test_upload_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"file body").unwrap();

        let storage = Arc::new(MemoryStorage::new());
        let rx = RxStorage::new(storage.clone(), config("b"));
        let events = drain(rx.upload_file("f.txt", file.path(), None)).await;
        assert!(events.iter().all(|e| e.is_ok()));
        assert_eq!(
            storage.object(&StorageLocation::new("b", "f.txt")).map(|(d, _)| d),
            Some(Bytes::from_static(b"file body"))
        );
    }

    #[tokio::test]
    async fn test_missing_file_fails_once() {
        let storage = Arc::new(MemoryStorage::new());
        let rx = RxStorage::new(storage, config("b"));
        let events = drain(rx.upload_file("f.txt", "/definitely/not/here", None)).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            Err(FirestreamError::Storage(err)) => assert_eq!(err.code, StorageError::OBJECT_NOT_FOUND),
            other => panic!("expected storage error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_touching_backend() {
        let storage = Arc::new(MemoryStorage::new());
        let rx = RxStorage::new(storage.clone(), StorageConfig::default());
        let events = drain(rx.upload_bytes("relative/path", "x", None)).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(FirestreamError::InvalidStorageUrl { .. })));
        assert_eq!(storage.object_count(), 0);
        assert!(storage.last_task().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_cancels_when_configured() {
        let storage = Arc::new(MemoryStorage::manual());
        let rx = RxStorage::new(
            storage.clone(),
            StorageConfig {
                bucket: Some("b".into()),
                cancel_on_unsubscribe: true,
            },
        );

        let mut stream = rx.upload_bytes("big.bin", vec![0u8; 1024], None);
        assert!(stream.next().now_or_never().is_none());
        let task = storage.last_task().unwrap();
        task.progress(UploadSnapshot {
            location: StorageLocation::new("b", "big.bin"),
            bytes_transferred: 512,
            total_bytes: Some(1024),
            state: UploadState::InProgress,
            metadata: None,
        });
        assert_eq!(stream.next().await.unwrap().unwrap().progress(), Some(0.5));

        stream.subscription().unsubscribe();
        assert!(stream.next().await.is_none());
        assert_eq!(task.cancel_count(), 1);
        assert_eq!(task.listener_count(), 0);
    }
}
