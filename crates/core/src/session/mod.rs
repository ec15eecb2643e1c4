//! Per-connection job sessions.
//!
//! A [`SessionController`] owns one client connection. It reads [`JobRequest`]s
//! from an inbound stream and writes [`ServerMessage`]s into a bounded channel
//! that the transport drains:
//!
//! ```text
//! Idle -> Analyzing -> Locating -> Transcoding -> Reporting -> Idle
//!            |            |             |
//!            +------------+-------------+--> Idle (failure reported)
//!
//! any state --> Closed
//! ```

mod controller;
mod error;
mod messages;
mod phase;
mod workspace;

pub use controller::{SessionContext, SessionController, SessionSummary};
pub use error::{JobError, SessionError};
pub use messages::{JobRequest, JobStage, ServerMessage};
pub use phase::SessionPhase;
pub use workspace::{JobPlan, Workspace};
