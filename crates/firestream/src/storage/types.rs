//! Storage types

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DOWNLOAD_PATH_PREFIX: [&str; 2] = ["v0", "b"];

/// Bucket and object path an upload targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageLocation {
    pub bucket: String,
    pub path: String,
}

impl StorageLocation {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
        }
    }

    /// Resolve an upload target.
    ///
    /// Accepts `gs://<bucket>/<path>`, a download URL of the form
    /// `https://<host>/v0/b/<bucket>/o/<encoded path>`, or a bare object path
    /// placed in `default_bucket`. The error is a human-readable reason.
    pub fn parse(input: &str, default_bucket: Option<&str>) -> Result<Self, String> {
        let input = input.trim();
        if input.is_empty() {
            return Err("empty location".to_string());
        }

        let location = match Url::parse(input) {
            Ok(url) => match url.scheme() {
                "gs" => {
                    let bucket = url.host_str().unwrap_or_default();
                    if bucket.is_empty() {
                        return Err("missing bucket name".to_string());
                    }
                    Self::new(bucket, decode(url.path().trim_start_matches('/'))?)
                }
                "http" | "https" => Self::from_download_url(&url)?,
                other => return Err(format!("unsupported scheme '{}'", other)),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let bucket = default_bucket
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| "relative path but no default bucket configured".to_string())?;
                Self::new(bucket, input.trim_start_matches('/'))
            }
            Err(e) => return Err(e.to_string()),
        };

        if location.path.is_empty() {
            return Err("cannot upload to the bucket root".to_string());
        }
        Ok(location)
    }

    fn from_download_url(url: &Url) -> Result<Self, String> {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.collect())
            .unwrap_or_default();

        match segments.as_slice() {
            [v0, b, bucket, o, rest @ ..]
                if [*v0, *b] == DOWNLOAD_PATH_PREFIX && *o == "o" && !bucket.is_empty() =>
            {
                Ok(Self::new(decode(bucket)?, decode(&rest.join("/"))?))
            }
            _ => Err("not a storage download url".to_string()),
        }
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

fn decode(raw: &str) -> Result<String, String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| format!("path is not valid UTF-8: {}", e))
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.path)
    }
}

/// Object metadata sent with an upload and reported back in snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageMetadata {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub cache_control: Option<String>,
    #[serde(default)]
    pub content_disposition: Option<String>,
    #[serde(default)]
    pub content_encoding: Option<String>,
    #[serde(default)]
    pub content_language: Option<String>,
    #[serde(default)]
    pub custom_metadata: BTreeMap<String, String>,
    /// Set by the service
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StorageMetadata {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    InProgress,
    Paused,
    Success,
    Canceled,
    Failure,
}

/// State of an upload at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSnapshot {
    pub location: StorageLocation,
    pub bytes_transferred: u64,
    /// Unknown for streamed uploads until they finish
    pub total_bytes: Option<u64>,
    pub state: UploadState,
    pub metadata: Option<StorageMetadata>,
}

impl UploadSnapshot {
    /// Fraction uploaded in `0.0..=1.0`, when the total is known
    pub fn progress(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(1.0),
            Some(total) => Some(self.bytes_transferred as f64 / total as f64),
            None => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == UploadState::Success
    }
}

/// Failure reported by an upload task
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct StorageError {
    pub code: i32,
    pub http_status: Option<u16>,
    pub message: String,
}

impl StorageError {
    pub const UNKNOWN: i32 = -13000;
    pub const OBJECT_NOT_FOUND: i32 = -13010;
    pub const BUCKET_NOT_FOUND: i32 = -13011;
    pub const PROJECT_NOT_FOUND: i32 = -13012;
    pub const QUOTA_EXCEEDED: i32 = -13013;
    pub const NOT_AUTHENTICATED: i32 = -13020;
    pub const NOT_AUTHORIZED: i32 = -13021;
    pub const RETRY_LIMIT_EXCEEDED: i32 = -13030;
    pub const INVALID_CHECKSUM: i32 = -13031;
    pub const CANCELED: i32 = -13040;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            http_status: None,
            message: message.into(),
        }
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}
