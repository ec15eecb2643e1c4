//! Error types for the session module.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use super::messages::JobStage;
use super::phase::SessionPhase;
use crate::locator::LocateError;
use crate::runner::RunnerError;
use crate::transcoder::TranscodeError;

/// A failure that ends one job; the session carries on.
#[derive(Debug, Error)]
pub enum JobError {
    /// The run directory could not be prepared.
    #[error("Failed to prepare {path}: {source}")]
    Workspace { path: PathBuf, source: io::Error },

    #[error("Analysis failed: {0}")]
    Analysis(#[source] RunnerError),

    #[error("Artifact lookup failed: {0}")]
    Locate(#[source] LocateError),

    #[error("Transcode failed: {0}")]
    Transcode(#[source] TranscodeError),
}

impl JobError {
    /// The stage reported to the client.
    pub fn stage(&self) -> JobStage {
        match self {
            Self::Workspace { .. } | Self::Analysis(_) => JobStage::Analysis,
            Self::Locate(_) => JobStage::Locate,
            Self::Transcode(_) => JobStage::Transcode,
        }
    }
}

/// A failure that ends the session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The client can no longer be written to.
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Illegal phase transition from {from} to {to}")]
    Phase { from: SessionPhase, to: SessionPhase },
}
