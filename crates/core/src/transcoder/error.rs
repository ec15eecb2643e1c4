//! Error types for the transcoder module.

use std::path::PathBuf;
use thiserror::Error;

use crate::runner::RunnerError;

/// Errors that can occur while transcoding an artifact.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Output directory does not exist and could not be created.
    #[error("Failed to create output directory {path}: {source}")]
    OutputDirectoryFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The transcoder could not be started, failed or timed out.
    #[error("Transcoder failed: {0}")]
    Runner(#[from] RunnerError),

    /// The transcoder reported success but left no output behind.
    #[error("Output file not created: {path}")]
    OutputMissing { path: PathBuf },

    /// The job was abandoned before the transcoder finished.
    #[error("Transcode cancelled")]
    Cancelled,
}
