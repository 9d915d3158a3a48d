//! Single-flight coordination of derivative builds.
//!
//! Popular files attract bursts of identical requests the moment a page
//! loads, and a build takes long enough (download, remux, upload) that a
//! burst would otherwise run the same job many times over. The coordinator
//! keys in-flight builds by derivative path: the first request starts the
//! build and every later one subscribes to its outcome.

use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::store::ObjectStore;

use super::{RemuxError, Remuxer, AUDIO_WEBM};

type BuildOutcome = Result<(), RemuxError>;

/// Runs derivative builds, collapsing concurrent requests for the same key.
pub struct RemuxCoordinator {
    store: Arc<dyn ObjectStore>,
    remuxer: Arc<dyn Remuxer>,
    in_flight: Arc<DashMap<String, broadcast::Sender<BuildOutcome>>>,
}

impl RemuxCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>, remuxer: Arc<dyn Remuxer>) -> Self {
        Self {
            store,
            remuxer,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Builds the derivative from its source, or waits for the in-flight
    /// build of the same derivative to finish.
    ///
    /// On `Ok` the derivative is in the store under `derivative`. The build
    /// runs on a detached task, so a waiter that disconnects cannot abort
    /// work other requests are waiting on.
    pub async fn build(&self, source: &str, derivative: &str) -> Result<(), RemuxError> {
        // The entry guard makes check-and-register atomic: either an entry
        // exists and we subscribe to it, or the channel is installed before
        // any other request can look.
        let mut outcome = match self.in_flight.entry(derivative.to_string()) {
            Entry::Occupied(entry) => {
                debug!(derivative = %derivative, "joining in-flight build");
                entry.get().subscribe()
            }
            Entry::Vacant(entry) => {
                let (tx, rx) = broadcast::channel(1);
                entry.insert(tx.clone());
                self.spawn_build(tx, source, derivative);
                rx
            }
        };

        match outcome.recv().await {
            Ok(result) => result,
            // Channel closed without a result: the build task is gone.
            Err(_) => Err(RemuxError::Abandoned),
        }
    }

    /// Number of builds currently in flight.
    pub fn in_flight_builds(&self) -> usize {
        self.in_flight.len()
    }

    fn spawn_build(&self, tx: broadcast::Sender<BuildOutcome>, source: &str, derivative: &str) {
        debug!(source = %source, derivative = %derivative, "starting remux build");

        let store = Arc::clone(&self.store);
        let remuxer = Arc::clone(&self.remuxer);
        let in_flight = Arc::clone(&self.in_flight);
        let source = source.to_string();
        let derivative = derivative.to_string();

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = run_build(store.as_ref(), remuxer.as_ref(), &source, &derivative).await;
            match &outcome {
                Ok(()) => info!(
                    derivative = %derivative,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "remux build completed"
                ),
                Err(err) => error!(
                    source = %source,
                    derivative = %derivative,
                    error = %err,
                    "remux build failed"
                ),
            }
            // Remove before sending: a request woken by this outcome must
            // never find the finished entry and subscribe to a channel that
            // will not speak again.
            in_flight.remove(&derivative);
            let _ = tx.send(outcome);
        });
    }
}

/// One complete build: download to scratch, remux, upload.
async fn run_build(
    store: &dyn ObjectStore,
    remuxer: &dyn Remuxer,
    source: &str,
    derivative: &str,
) -> BuildOutcome {
    // Removed on drop, covering every early return below.
    let scratch = TempDir::new().map_err(|err| RemuxError::Scratch(err.to_string()))?;
    let input = scratch.path().join("source");
    let output = scratch.path().join("output.webm");

    store
        .download_to_file(source, &input)
        .await
        .map_err(RemuxError::Download)?;

    remuxer.remux(&input, &output).await?;

    // A zero exit does not guarantee the target was written.
    if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
        return Err(RemuxError::MissingOutput);
    }

    store
        .upload_from_file(&output, derivative, AUDIO_WEBM)
        .await
        .map_err(RemuxError::Upload)
}
