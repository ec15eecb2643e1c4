//! Messages exchanged with the client.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A client request to analyze one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// URL or path handed to the analysis program.
    #[serde(default, alias = "message")]
    pub source_locator: Option<String>,
}

impl JobRequest {
    pub fn new(source_locator: impl Into<String>) -> Self {
        Self {
            source_locator: Some(source_locator.into()),
        }
    }

    /// The trimmed locator, or `None` when missing or blank.
    pub fn locator(&self) -> Option<&str> {
        self.source_locator
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Stage of a job that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Analysis,
    Locate,
    Transcode,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Locate => "locate",
            Self::Transcode => "transcode",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server to client message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// One output line of the analysis program.
    Progress { line: String },
    /// Analysis finished successfully.
    Completed,
    /// Where the transcoded result can be fetched.
    Result { video_url: String },
    /// The job failed; the session stays open.
    Failure { stage: JobStage, error: String },
}
