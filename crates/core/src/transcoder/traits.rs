//! Trait definitions for the transcoder module.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::TranscodeError;
use super::types::{TranscodeJob, TranscodeResult};

/// Turns an analysis artifact into the file served to clients.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Returns the name of this transcoder implementation.
    fn name(&self) -> &str;

    /// Transcodes `job.input_path` into `job.output_path`.
    ///
    /// When `cancel` fires, any running process is stopped and reaped before
    /// [`TranscodeError::Cancelled`] is returned.
    async fn transcode(
        &self,
        job: TranscodeJob,
        cancel: CancellationToken,
    ) -> Result<TranscodeResult, TranscodeError>;

    /// Validates that the transcoder is properly configured and ready.
    async fn validate(&self) -> Result<(), TranscodeError>;
}
