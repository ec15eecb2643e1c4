//! Error types for the runner module.

use std::io;
use thiserror::Error;

use super::types::StreamSource;

/// Errors produced while launching or draining an external program.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The program could not be started (missing binary, permissions, bad working dir).
    #[error("Failed to launch {program}: {source}")]
    Launch { program: String, source: io::Error },

    /// Reading one of the output pipes failed.
    #[error("Failed to read {stream}: {source}")]
    Read {
        stream: StreamSource,
        source: io::Error,
    },

    /// Waiting for the process to exit failed.
    #[error("Failed to wait for {program}: {source}")]
    Wait { program: String, source: io::Error },

    /// The program ran but did not exit successfully.
    #[error("{program} exited with {status}")]
    Exit {
        program: String,
        status: String,
        code: Option<i32>,
    },

    /// The program ran past its deadline and was killed.
    #[error("{program} timed out after {timeout_secs} seconds")]
    Timeout { program: String, timeout_secs: u64 },
}

impl RunnerError {
    /// Creates a launch error.
    pub fn launch(program: impl Into<String>, source: io::Error) -> Self {
        Self::Launch {
            program: program.into(),
            source,
        }
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Launch { .. } => "launch",
            Self::Read { .. } => "read",
            Self::Wait { .. } => "wait",
            Self::Exit { .. } => "exit",
            Self::Timeout { .. } => "timeout",
        }
    }
}
