//! Runs external programs and streams their combined output.
//!
//! [`merge_lines`] turns a process's stdout and stderr into a single stream of
//! lines ordered by arrival. [`run`] starts a program described by a
//! [`CommandSpec`] and hands back a [`RunningJob`] that yields those lines,
//! applies the suppression filter, enforces the optional deadline and reports
//! the exit status once the output is drained.
//!
//! # Example
//!
//! ```ignore
//! use vidscope_core::runner::{run, CommandSpec, LineFilter};
//!
//! let spec = CommandSpec::new("yolo", "/usr/src/ultralytics")
//!     .with_args(["detect", "predict", "source=video.mp4"])
//!     .with_filter(LineFilter::new(["WARNING"]));
//!
//! let mut job = run(&spec)?;
//! while let Some(line) = job.next_line().await {
//!     println!("{}", line?.text);
//! }
//! ```

mod error;
mod multiplex;
mod process;
mod types;

pub use error::RunnerError;
pub use multiplex::{merge_lines, read_lines};
pub use process::{run, RunningJob};
pub use types::{CommandSpec, LineFilter, OutputLine, StreamSource};
