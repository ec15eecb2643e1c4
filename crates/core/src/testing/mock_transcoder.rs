//! Mock transcoder for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::transcoder::{TranscodeError, TranscodeJob, TranscodeResult, Transcoder};

/// Bytes written to every output file.
pub const MOCK_OUTPUT: &[u8] = b"mock mp4";

/// A recorded transcode for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedTranscode {
    /// The job that was submitted.
    pub job: TranscodeJob,
    /// Whether the transcode succeeded.
    pub success: bool,
}

/// Mock implementation of the Transcoder trait.
///
/// Records every job, writes a small file at the output path and can be told
/// to fail or to take a while. A delayed transcode honours cancellation.
///
/// # Example
///
/// ```rust,ignore
/// use vidscope_core::testing::MockTranscoder;
///
/// let transcoder = MockTranscoder::new();
/// transcoder.set_next_error(TranscodeError::OutputMissing { path }).await;
///
/// // Run a session...
///
/// let jobs = transcoder.recorded_transcodes().await;
/// assert_eq!(jobs.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockTranscoder {
    transcodes: Arc<RwLock<Vec<RecordedTranscode>>>,
    /// If set, the next transcode fails with this error.
    next_error: Arc<RwLock<Option<TranscodeError>>>,
    /// Simulated transcode duration.
    delay: Arc<RwLock<Duration>>,
}

impl MockTranscoder {
    /// Create a new mock transcoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded transcodes.
    pub async fn recorded_transcodes(&self) -> Vec<RecordedTranscode> {
        self.transcodes.read().await.clone()
    }

    /// Get the number of transcodes performed.
    pub async fn transcode_count(&self) -> usize {
        self.transcodes.read().await.len()
    }

    /// Configure the next transcode to fail with the given error.
    pub async fn set_next_error(&self, error: TranscodeError) {
        *self.next_error.write().await = Some(error);
    }

    /// Set the simulated transcode duration.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn transcode(
        &self,
        job: TranscodeJob,
        cancel: CancellationToken,
    ) -> Result<TranscodeResult, TranscodeError> {
        let error = self.next_error.write().await.take();
        if let Some(err) = error {
            self.transcodes.write().await.push(RecordedTranscode {
                job,
                success: false,
            });
            return Err(err);
        }

        self.transcodes.write().await.push(RecordedTranscode {
            job: job.clone(),
            success: true,
        });

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    if let Some(last) = self.transcodes.write().await.last_mut() {
                        last.success = false;
                    }
                    return Err(TranscodeError::Cancelled);
                }
            }
        }

        if let Some(parent) = job.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TranscodeError::OutputDirectoryFailed {
                    path: parent.to_path_buf(),
                    source: e,
                }
            })?;
        }
        tokio::fs::write(&job.output_path, MOCK_OUTPUT)
            .await
            .map_err(|_| TranscodeError::OutputMissing {
                path: job.output_path.clone(),
            })?;

        Ok(TranscodeResult {
            job_id: job.job_id,
            output_path: job.output_path,
            output_size_bytes: MOCK_OUTPUT.len() as u64,
            duration_ms: delay.as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), TranscodeError> {
        Ok(())
    }
}
