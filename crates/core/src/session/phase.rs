//! Session state machine.

use serde::Serialize;
use std::fmt;

/// Where a session is in its job cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Waiting for a request.
    Idle,
    /// The analysis program is running.
    Analyzing,
    /// Searching for the produced artifact.
    Locating,
    /// The transcoder is running.
    Transcoding,
    /// Sending the result reference.
    Reporting,
    /// The connection is gone.
    Closed,
}

impl SessionPhase {
    /// Whether moving from `self` to `next` follows the job cycle.
    ///
    /// Failing stages fall back to `Idle`; `Closed` is reachable from anywhere and is terminal.
    pub fn can_transition_to(&self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Analyzing) => true,
            (Analyzing, Locating | Idle) => true,
            (Locating, Transcoding | Idle) => true,
            (Transcoding, Reporting | Idle) => true,
            (Reporting, Idle) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Analyzing => "analyzing",
            Self::Locating => "locating",
            Self::Transcoding => "transcoding",
            Self::Reporting => "reporting",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
