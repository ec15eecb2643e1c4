//! Transcoder step: converts the analysis artifact into a web-playable file.
//!
//! The [`Transcoder`] trait lets the session controller run against a mock in
//! tests; [`FfmpegTranscoder`] is the production implementation and drives
//! `ffmpeg` through the job runner.

mod error;
mod ffmpeg;
mod traits;
mod types;

pub use error::TranscodeError;
pub use ffmpeg::FfmpegTranscoder;
pub use traits::Transcoder;
pub use types::{TranscodeJob, TranscodeResult};
