//! S3-compatible backend over the AWS SDK.
//!
//! Built for MinIO-style deployments: path-style addressing, static
//! credentials, and an explicit endpoint. Point operations get a short
//! deadline; whole-file transfers get a longer one sized for audio files.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::config::StoreConfig;

use super::{object_key, ObjectStore, ObjectStoreError, StoreOp, StoredObject};

/// Deadline for existence checks, deletes, and fetch initiation.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for complete file transfers.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

/// Object store backed by an S3-compatible service.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Connects to an S3-compatible endpoint with static credentials.
    ///
    /// Path-style addressing is forced so bucket names resolve against
    /// endpoints that have no virtual-host DNS, MinIO in particular.
    pub async fn connect(config: &StoreConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "webmux-static",
        );
        let base = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&base)
            .endpoint_url(config.endpoint.as_str())
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(object_key(key))
            .send();

        match tokio::time::timeout(REQUEST_TIMEOUT, head).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(err)) if absent_on_head(&err) => Ok(false),
            Ok(Err(err)) => Err(request_error(StoreOp::Exists, key, err)),
            Err(_) => Err(timeout_error(StoreOp::Exists, key, REQUEST_TIMEOUT)),
        }
    }

    async fn get(&self, key: &str) -> Result<StoredObject, ObjectStoreError> {
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_key(key))
            .send();

        let output = tokio::time::timeout(REQUEST_TIMEOUT, request)
            .await
            .map_err(|_| timeout_error(StoreOp::Get, key, REQUEST_TIMEOUT))?
            .map_err(|err| request_error(StoreOp::Get, key, err))?;

        let content_length = output
            .content_length()
            .and_then(|length| u64::try_from(length).ok());
        let content_type = output.content_type().map(str::to_string);

        // The timeout above only bounds time to first byte; the body
        // streams at the client's pace.
        let stream_key = key.to_string();
        let body = ReaderStream::new(output.body.into_async_read())
            .map(move |chunk| {
                chunk.map_err(|err| ObjectStoreError::Request {
                    op: StoreOp::Get,
                    key: stream_key.clone(),
                    message: err.to_string(),
                })
            })
            .boxed();

        Ok(StoredObject {
            content_length,
            content_type,
            body,
        })
    }

    async fn download_to_file(&self, key: &str, dest: &Path) -> Result<(), ObjectStoreError> {
        let transfer = async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(object_key(key))
                .send()
                .await
                .map_err(|err| request_error(StoreOp::Download, key, err))?;

            let mut reader = output.body.into_async_read();
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|err| local_io(StoreOp::Download, dest, &err))?;
            tokio::io::copy(&mut reader, &mut file)
                .await
                .map_err(|err| ObjectStoreError::Request {
                    op: StoreOp::Download,
                    key: key.to_string(),
                    message: err.to_string(),
                })?;
            file.flush()
                .await
                .map_err(|err| local_io(StoreOp::Download, dest, &err))?;
            Ok(())
        };

        tokio::time::timeout(TRANSFER_TIMEOUT, transfer)
            .await
            .map_err(|_| timeout_error(StoreOp::Download, key, TRANSFER_TIMEOUT))?
    }

    async fn upload_from_file(
        &self,
        src: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let transfer = async {
            let body = ByteStream::from_path(src)
                .await
                .map_err(|err| local_io(StoreOp::Upload, src, &err))?;
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(object_key(key))
                .body(body)
                .content_type(content_type)
                .send()
                .await
                .map_err(|err| request_error(StoreOp::Upload, key, err))?;
            debug!(key = %key, "object uploaded");
            Ok(())
        };

        tokio::time::timeout(TRANSFER_TIMEOUT, transfer)
            .await
            .map_err(|_| timeout_error(StoreOp::Upload, key, TRANSFER_TIMEOUT))?
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let request = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(object_key(key))
            .send();

        tokio::time::timeout(REQUEST_TIMEOUT, request)
            .await
            .map_err(|_| timeout_error(StoreOp::Delete, key, REQUEST_TIMEOUT))?
            .map_err(|err| request_error(StoreOp::Delete, key, err))?;

        debug!(key = %key, "object deleted");
        Ok(())
    }
}

/// Absence as HEAD reports it. Stores behind restrictive policies answer
/// 403 instead of 404 for keys that are not there, so both count.
fn absent_on_head(err: &SdkError<HeadObjectError>) -> bool {
    match err {
        SdkError::ServiceError(context) => {
            context.err().is_not_found() || matches!(context.raw().status().as_u16(), 403 | 404)
        }
        _ => false,
    }
}

fn request_error<E>(op: StoreOp, key: &str, err: SdkError<E>) -> ObjectStoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ObjectStoreError::Request {
        op,
        key: key.to_string(),
        message: DisplayErrorContext(&err).to_string(),
    }
}

fn timeout_error(op: StoreOp, key: &str, deadline: Duration) -> ObjectStoreError {
    ObjectStoreError::Timeout {
        op,
        key: key.to_string(),
        seconds: deadline.as_secs(),
    }
}

fn local_io(op: StoreOp, path: &Path, err: &dyn std::fmt::Display) -> ObjectStoreError {
    ObjectStoreError::LocalIo {
        op,
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
