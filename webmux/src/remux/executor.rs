//! Remux executor: repackage Ogg audio into a WebM container.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use super::RemuxError;

/// Turns a downloaded source file into a WebM file on disk.
#[async_trait]
pub trait Remuxer: Send + Sync {
    /// Repackages `input` into a WebM container at `output`.
    ///
    /// Stream data is copied, not re-encoded; Ogg and WebM both carry the
    /// Opus or Vorbis payload unchanged.
    async fn remux(&self, input: &Path, output: &Path) -> Result<(), RemuxError>;
}

/// [`Remuxer`] that shells out to ffmpeg.
pub struct FfmpegRemuxer {
    program: PathBuf,
}

impl FfmpegRemuxer {
    /// Uses `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("ffmpeg")
    }

    /// Uses an explicit executable, mainly for tests.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-i").arg(input);
        cmd.args(["-c", "copy", "-f", "webm"]);
        cmd.arg(output);
        cmd
    }
}

impl Default for FfmpegRemuxer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn remux(&self, input: &Path, output: &Path) -> Result<(), RemuxError> {
        let result = self
            .command(input, output)
            .output()
            .await
            .map_err(|err| RemuxError::Launch(format!("{}: {err}", self.program.display())))?;

        if !result.status.success() {
            // ffmpeg writes its diagnostics to stderr, stdout carries data.
            return Err(RemuxError::Executor {
                status: result.status.to_string(),
                diagnostic: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}
