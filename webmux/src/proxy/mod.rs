//! HTTP surface of the proxy.
//!
//! One wildcard route covers the whole request space: GET serves (and
//! lazily builds) derivatives, DELETE evicts them, and every other
//! method, HEAD included, is rejected.

mod error;
mod handler;

pub use error::ProxyError;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::remux::{RemuxCoordinator, Remuxer};
use crate::store::ObjectStore;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct ProxyState {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) coordinator: Arc<RemuxCoordinator>,
}

impl ProxyState {
    /// Wires the store and remux executor into handler state.
    pub fn new(store: Arc<dyn ObjectStore>, remuxer: Arc<dyn Remuxer>) -> Self {
        let coordinator = Arc::new(RemuxCoordinator::new(Arc::clone(&store), remuxer));
        Self { store, coordinator }
    }
}

/// Builds the complete proxy router.
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route(
            "/{*path}",
            get(handler::get_derivative)
                .head(handler::reject_head)
                .delete(handler::delete_derivative),
        )
        .fallback(handler::reject_unroutable)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
