//! Request-level errors and their HTTP encoding.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, error};

use crate::path::PathError;
use crate::remux::RemuxError;
use crate::store::{ObjectStoreError, StoreOp};

/// Errors surfaced to HTTP clients by the proxy handlers.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request does not name a remux-eligible path (400).
    #[error("{0}")]
    InvalidRequest(String),
    /// Neither the derivative nor its source is stored (404).
    #[error("{0}")]
    NotFound(String),
    /// The method is not part of the proxy surface (405).
    #[error("method not allowed")]
    MethodNotAllowed,
    /// The object store failed in a way that is not plain absence (500).
    #[error(transparent)]
    Store(#[from] ObjectStoreError),
    /// Building the derivative failed (500).
    #[error(transparent)]
    Build(#[from] RemuxError),
}

impl From<PathError> for ProxyError {
    fn from(err: PathError) -> Self {
        ProxyError::InvalidRequest(err.to_string())
    }
}

impl ProxyError {
    fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::Store(_) | ProxyError::Build(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Server-side failure detail goes to the log, never to the client.
        let body = match &self {
            ProxyError::Store(err) if err.op() == StoreOp::Delete => {
                error!(error = %err, "transcoded file deletion failed");
                "Failed to delete transcoded file".to_string()
            }
            ProxyError::Store(err) => {
                error!(error = %err, "object store failure");
                "Internal Server Error".to_string()
            }
            ProxyError::Build(err) => {
                error!(error = %err, "remux build failed");
                "Internal Server Error".to_string()
            }
            other => {
                debug!(status = status.as_u16(), error = %other, "request rejected");
                other.to_string()
            }
        };

        (status, body).into_response()
    }
}
