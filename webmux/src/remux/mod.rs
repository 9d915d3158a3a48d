//! Building derivatives: a single-flight coordinator around a remux
//! executor.
//!
//! A build downloads the source object into scratch space, repackages it
//! with the executor, and uploads the result back to the store. Concurrent
//! requests for the same derivative share one build instead of racing.

mod coordinator;
mod executor;

pub use coordinator::RemuxCoordinator;
pub use executor::{FfmpegRemuxer, Remuxer};

use thiserror::Error;

use crate::store::ObjectStoreError;

/// Content type derivatives are uploaded and served with.
pub const AUDIO_WEBM: &str = "audio/webm";

/// Errors from building a derivative.
///
/// Cloneable so one build's outcome can be handed to every waiting request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemuxError {
    /// Scratch directory could not be created.
    #[error("scratch directory unavailable: {0}")]
    Scratch(String),
    /// The source object could not be downloaded.
    #[error("source download failed: {0}")]
    Download(ObjectStoreError),
    /// The executor process could not be started.
    #[error("could not launch remux executor: {0}")]
    Launch(String),
    /// The executor ran and reported failure.
    #[error("remux executor failed ({status}): {diagnostic}")]
    Executor { status: String, diagnostic: String },
    /// The executor reported success but wrote no output file.
    #[error("remux executor produced no output file")]
    MissingOutput,
    /// The finished derivative could not be uploaded.
    #[error("derivative upload failed: {0}")]
    Upload(ObjectStoreError),
    /// The build task went away without reporting an outcome.
    #[error("remux build abandoned before completion")]
    Abandoned,
}
