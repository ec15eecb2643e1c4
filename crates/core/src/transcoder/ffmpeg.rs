//! FFmpeg-based transcoder implementation.

use async_trait::async_trait;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::TranscodeError;
use super::traits::Transcoder;
use super::types::{TranscodeJob, TranscodeResult};
use crate::config::TranscodeConfig;
use crate::runner::{run, CommandSpec};

/// FFmpeg-based transcoder implementation.
pub struct FfmpegTranscoder {
    config: TranscodeConfig,
}

impl FfmpegTranscoder {
    /// Creates a new FFmpeg transcoder with the given configuration.
    pub fn new(config: TranscodeConfig) -> Self {
        Self { config }
    }

    /// Builds ffmpeg arguments for one transcode.
    fn build_args(&self, input_path: &Path, output_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(), // Overwrite output
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
            "-vcodec".to_string(),
            self.config.video_codec.clone(),
            "-vprofile".to_string(),
            self.config.profile.clone(),
            "-crf".to_string(),
            self.config.crf.to_string(),
        ];

        // Extra args
        args.extend(self.config.extra_args.iter().cloned());

        args.push(output_path.to_string_lossy().to_string());
        args
    }

    fn command(&self, args: Vec<String>) -> CommandSpec {
        CommandSpec::new(&self.config.program, &self.config.working_dir)
            .with_args(args)
            .with_timeout(self.config.timeout_secs.map(Duration::from_secs))
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn transcode(
        &self,
        job: TranscodeJob,
        cancel: CancellationToken,
    ) -> Result<TranscodeResult, TranscodeError> {
        let start = Instant::now();

        if tokio::fs::metadata(&job.input_path).await.is_err() {
            return Err(TranscodeError::InputNotFound {
                path: job.input_path.clone(),
            });
        }

        // Ensure output directory exists
        if let Some(parent) = job.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TranscodeError::OutputDirectoryFailed {
                    path: parent.to_path_buf(),
                    source: e,
                }
            })?;
        }

        let args = self.build_args(&job.input_path, &job.output_path);
        debug!(job_id = %job.job_id, ?args, "Running ffmpeg");

        let mut process = run(&self.command(args))?;
        let drained = tokio::select! {
            drained = process.drain() => Some(drained),
            _ = cancel.cancelled() => None,
        };
        let lines = match drained {
            Some(drained) => drained?,
            None => {
                let grace = Duration::from_secs(self.config.kill_grace_secs);
                if !process.terminate(grace).await {
                    warn!(job_id = %job.job_id, "ffmpeg was not reaped after cancellation");
                }
                return Err(TranscodeError::Cancelled);
            }
        };

        let output_meta = tokio::fs::metadata(&job.output_path).await.map_err(|_| {
            TranscodeError::OutputMissing {
                path: job.output_path.clone(),
            }
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            job_id = %job.job_id,
            output = %job.output_path.display(),
            size = output_meta.len(),
            lines,
            duration_ms,
            "Transcode finished"
        );

        Ok(TranscodeResult {
            job_id: job.job_id,
            output_path: job.output_path,
            output_size_bytes: output_meta.len(),
            duration_ms,
        })
    }

    async fn validate(&self) -> Result<(), TranscodeError> {
        let mut process = run(&self.command(vec!["-version".to_string()]))?;
        process.drain().await?;
        Ok(())
    }
}
