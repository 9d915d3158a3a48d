//! Request handlers for the proxy's two operations.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use tracing::{debug, warn};

use crate::path::{canonical_transcoded_key, derive_source, is_derivative_path, PathError};
use crate::remux::AUDIO_WEBM;

use super::{ProxyError, ProxyState};

/// GET: serve the derivative, building it first on a cache miss.
pub(super) async fn get_derivative(
    State(state): State<ProxyState>,
    Path(path): Path<String>,
) -> Result<Response, ProxyError> {
    let path = format!("/{path}");
    if !is_derivative_path(&path) {
        return Err(PathError::NotDerivative(path).into());
    }

    if state.store.exists(&path).await? {
        return serve(&state, &path).await;
    }

    let source = derive_source(&path)?;
    debug!(derivative = %path, source = %source, "cache miss, building derivative");

    if !state.store.exists(&source).await? {
        return Err(ProxyError::NotFound(format!(
            "original file not found: {source}"
        )));
    }

    state.coordinator.build(&source, &path).await?;
    serve(&state, &path).await
}

/// DELETE: remove the stored derivative, addressed by either path shape.
pub(super) async fn delete_derivative(
    State(state): State<ProxyState>,
    Path(path): Path<String>,
) -> Result<Response, ProxyError> {
    let path = format!("/{path}");
    let key = canonical_transcoded_key(&path)?;
    if !is_derivative_path(&key) {
        return Err(ProxyError::InvalidRequest(format!(
            "not a valid transcoded file path: {path}"
        )));
    }

    if !state.store.exists(&key).await? {
        return Err(ProxyError::NotFound(format!(
            "transcoded file not found: {key}"
        )));
    }

    state.store.delete(&key).await?;
    debug!(key = %key, "derivative deleted");
    Ok("Transcoded file deleted successfully".into_response())
}

/// HEAD is rejected explicitly; the get route would otherwise answer it.
pub(super) async fn reject_head() -> ProxyError {
    ProxyError::MethodNotAllowed
}

/// Fallback for requests the wildcard route cannot match, `/` in practice.
pub(super) async fn reject_unroutable(method: Method, uri: Uri) -> ProxyError {
    if method == Method::GET || method == Method::DELETE {
        ProxyError::InvalidRequest(format!("not a webm remux request: {}", uri.path()))
    } else {
        ProxyError::MethodNotAllowed
    }
}

/// Streams a stored derivative with the fixed serving headers.
async fn serve(state: &ProxyState, key: &str) -> Result<Response, ProxyError> {
    let object = state.store.get(key).await?;

    let stream_key = key.to_string();
    let body = Body::from_stream(object.body.inspect_err(move |err| {
        // Too late for an error status; the transfer just ends here.
        warn!(key = %stream_key, error = %err, "derivative stream interrupted");
    }));

    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(AUDIO_WEBM));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("max-age=86400"),
    );
    if let Some(length) = object.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    Ok(response)
}
