//! Object store access for source audio and cached derivatives.
//!
//! The store is the single source of truth: derivatives live next to the
//! originals and survive process restarts. Everything above this module
//! talks to [`ObjectStore`] as a trait object, so the S3 backend can be
//! swapped for the in-memory backend in tests.
//!
//! Keys are store-relative paths with a leading `/` (`/wiki/4/40/abc.oga`);
//! the slash is trimmed at the backend boundary.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

mod memory;
mod s3;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

/// Streamed object body.
pub type ObjectBody = BoxStream<'static, Result<Bytes, ObjectStoreError>>;

/// An object fetched from the store, with its body still streaming.
pub struct StoredObject {
    /// Size in bytes when the backend reports one.
    pub content_length: Option<u64>,
    /// Content type recorded at upload time, if any.
    pub content_type: Option<String>,
    pub body: ObjectBody,
}

// The body is a live stream, so Debug covers the metadata only.
impl std::fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredObject")
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// The store operation an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Exists,
    Get,
    Download,
    Upload,
    Delete,
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StoreOp::Exists => "existence check",
            StoreOp::Get => "object fetch",
            StoreOp::Download => "object download",
            StoreOp::Upload => "object upload",
            StoreOp::Delete => "object delete",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by object store backends.
///
/// Variants carry string payloads so an error can be cloned into every
/// waiter of a shared build and into streamed bodies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectStoreError {
    /// The backend rejected or failed the request.
    #[error("{op} failed for {key}: {message}")]
    Request {
        op: StoreOp,
        key: String,
        message: String,
    },
    /// The operation exceeded its deadline.
    #[error("{op} timed out for {key} after {seconds}s")]
    Timeout {
        op: StoreOp,
        key: String,
        seconds: u64,
    },
    /// A local file taking part in a transfer could not be used.
    #[error("local file error during {op} for {path}: {message}")]
    LocalIo {
        op: StoreOp,
        path: String,
        message: String,
    },
}

impl ObjectStoreError {
    /// The store operation that failed.
    pub fn op(&self) -> StoreOp {
        match self {
            ObjectStoreError::Request { op, .. }
            | ObjectStoreError::Timeout { op, .. }
            | ObjectStoreError::LocalIo { op, .. } => *op,
        }
    }
}

/// Narrow contract the proxy holds against the object store.
///
/// `exists` deliberately widens "not found" and "forbidden" responses to
/// `Ok(false)`: stores fronted by restrictive policies answer HEAD with 403
/// for absent keys, and the proxy treats both the same way.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Checks whether an object is present.
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;

    /// Fetches an object for streaming to a client.
    async fn get(&self, key: &str) -> Result<StoredObject, ObjectStoreError>;

    /// Downloads an object into a local file.
    async fn download_to_file(&self, key: &str, dest: &Path) -> Result<(), ObjectStoreError>;

    /// Uploads a local file under the given key.
    async fn upload_from_file(
        &self,
        src: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;

    /// Removes an object. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
}

/// Store keys carry a leading slash in the proxy; backends address objects
/// without it.
pub(crate) fn object_key(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}
