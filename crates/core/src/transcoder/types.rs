//! Types for the transcoder module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One transcode of a located artifact into a web-playable file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeJob {
    /// Identifier used in logs.
    pub job_id: String,
    pub input_path: PathBuf,
    /// Overwritten if it already exists.
    pub output_path: PathBuf,
}

/// Outcome of a successful transcode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeResult {
    pub job_id: String,
    pub output_path: PathBuf,
    pub output_size_bytes: u64,
    pub duration_ms: u64,
}
