//! In-memory object store for tests.
//!
//! Mirrors the observable behavior of the S3 backend (leading-slash
//! trimming, tolerant deletes) and additionally counts calls per operation
//! and lets tests inject failures, so orchestration tests can assert
//! exactly which store operations a request performed.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;

use super::{object_key, ObjectStore, ObjectStoreError, StoreOp, StoredObject};

struct StoredBytes {
    content_type: String,
    data: Bytes,
}

/// Object store backed by a process-local map.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, StoredBytes>,
    failures: DashMap<StoreOp, ObjectStoreError>,
    counters: CallCounters,
}

#[derive(Default)]
struct CallCounters {
    exists: AtomicUsize,
    get: AtomicUsize,
    download: AtomicUsize,
    upload: AtomicUsize,
    delete: AtomicUsize,
}

impl CallCounters {
    fn slot(&self, op: StoreOp) -> &AtomicUsize {
        match op {
            StoreOp::Exists => &self.exists,
            StoreOp::Get => &self.get,
            StoreOp::Download => &self.download,
            StoreOp::Upload => &self.upload,
            StoreOp::Delete => &self.delete,
        }
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object, normalizing the key the way the real backend does.
    pub fn insert(&self, key: &str, content_type: &str, data: impl Into<Bytes>) {
        self.objects.insert(
            object_key(key).to_string(),
            StoredBytes {
                content_type: content_type.to_string(),
                data: data.into(),
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(object_key(key))
    }

    /// Stored bytes for a key, if present.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects
            .get(object_key(key))
            .map(|entry| entry.data.clone())
    }

    /// Content type recorded for a key, if present.
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .get(object_key(key))
            .map(|entry| entry.content_type.clone())
    }

    /// Makes every subsequent call of `op` fail with `err`.
    pub fn fail_with(&self, op: StoreOp, err: ObjectStoreError) {
        self.failures.insert(op, err);
    }

    /// Removes an injected failure.
    pub fn clear_failure(&self, op: StoreOp) {
        self.failures.remove(&op);
    }

    /// Number of times `op` has been invoked, failures included.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.counters.slot(op).load(Ordering::SeqCst)
    }

    fn enter(&self, op: StoreOp) -> Result<(), ObjectStoreError> {
        self.counters.slot(op).fetch_add(1, Ordering::SeqCst);
        match self.failures.get(&op) {
            Some(entry) => Err(entry.value().clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        self.enter(StoreOp::Exists)?;
        Ok(self.objects.contains_key(object_key(key)))
    }

    async fn get(&self, key: &str) -> Result<StoredObject, ObjectStoreError> {
        self.enter(StoreOp::Get)?;
        let (data, content_type) = {
            let entry = self
                .objects
                .get(object_key(key))
                .ok_or_else(|| no_such_key(StoreOp::Get, key))?;
            (entry.data.clone(), entry.content_type.clone())
        };

        Ok(StoredObject {
            content_length: Some(data.len() as u64),
            content_type: Some(content_type),
            body: futures::stream::iter([Ok(data)]).boxed(),
        })
    }

    async fn download_to_file(&self, key: &str, dest: &Path) -> Result<(), ObjectStoreError> {
        self.enter(StoreOp::Download)?;
        let data = self
            .object(key)
            .ok_or_else(|| no_such_key(StoreOp::Download, key))?;
        tokio::fs::write(dest, &data)
            .await
            .map_err(|err| ObjectStoreError::LocalIo {
                op: StoreOp::Download,
                path: dest.display().to_string(),
                message: err.to_string(),
            })
    }

    async fn upload_from_file(
        &self,
        src: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        self.enter(StoreOp::Upload)?;
        let data = tokio::fs::read(src)
            .await
            .map_err(|err| ObjectStoreError::LocalIo {
                op: StoreOp::Upload,
                path: src.display().to_string(),
                message: err.to_string(),
            })?;
        self.insert(key, content_type, data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.enter(StoreOp::Delete)?;
        self.objects.remove(object_key(key));
        Ok(())
    }
}

fn no_such_key(op: StoreOp, key: &str) -> ObjectStoreError {
    ObjectStoreError::Request {
        op,
        key: key.to_string(),
        message: "no such key".to_string(),
    }
}
