//! Spawns one external program and yields its output lines.

use futures::stream::BoxStream;
use futures::StreamExt;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::error::RunnerError;
use super::multiplex::merge_lines;
use super::types::{CommandSpec, LineFilter, OutputLine};
use crate::metrics::LINES_SUPPRESSED;

/// How long a killed process gets to be reaped on failure paths.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Starts `spec.program` and returns a handle that yields its output lines.
///
/// Fails immediately with [`RunnerError::Launch`] when the program cannot be started.
pub fn run(spec: &CommandSpec) -> Result<RunningJob, RunnerError> {
    let program = spec.display_name();

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(&spec.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RunnerError::launch(&program, e))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RunnerError::launch(&program, io::Error::other("stdout not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RunnerError::launch(&program, io::Error::other("stderr not captured")))?;

    info!(
        program = %program,
        pid = child.id(),
        working_dir = %spec.working_dir.display(),
        "Started external program"
    );

    Ok(RunningJob {
        program,
        child,
        lines: merge_lines(stdout, stderr).boxed(),
        filter: spec.filter.clone(),
        timeout: spec.timeout,
        deadline: spec.timeout.map(|t| Instant::now() + t),
        forwarded: 0,
        suppressed: 0,
        failure: None,
        finished: false,
    })
}

/// A running external program.
///
/// The process is killed when the handle is dropped before it finished.
pub struct RunningJob {
    program: String,
    child: Child,
    lines: BoxStream<'static, Result<OutputLine, RunnerError>>,
    filter: LineFilter,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    forwarded: u64,
    suppressed: u64,
    /// Error waiting to be yielded; kept here so a cancelled `next_line` does not lose it.
    failure: Option<RunnerError>,
    finished: bool,
}

impl RunningJob {
    /// OS process id, if the process has not been reaped yet.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn forwarded_count(&self) -> u64 {
        self.forwarded
    }

    pub fn suppressed_count(&self) -> u64 {
        self.suppressed
    }

    /// Next unfiltered line.
    ///
    /// `None` means both pipes are drained and the program exited successfully.
    /// A non-zero exit is reported as [`RunnerError::Exit`] only after every line
    /// has been yielded.
    ///
    /// Cancel-safe: dropping the returned future loses no line and no error.
    pub async fn next_line(&mut self) -> Option<Result<OutputLine, RunnerError>> {
        if self.finished {
            if let Some(e) = self.failure.take() {
                self.reap(KILL_GRACE).await;
                return Some(Err(e));
            }
            return None;
        }

        loop {
            let next = match self.deadline {
                Some(deadline) => match timeout_at(deadline, self.lines.next()).await {
                    Ok(next) => next,
                    Err(_) => return self.expire().await,
                },
                None => self.lines.next().await,
            };

            match next {
                Some(Ok(line)) => {
                    if self.filter.matches(&line.text) {
                        self.suppressed += 1;
                        LINES_SUPPRESSED.inc();
                        debug!(program = %self.program, source = %line.source, "suppressed: {}", line.text);
                        continue;
                    }
                    self.forwarded += 1;
                    return Some(Ok(line));
                }
                Some(Err(e)) => return self.fail_with(e).await,
                None => return self.finish().await,
            }
        }
    }

    /// Consumes every remaining line, logging each one, and reports the exit outcome.
    pub async fn drain(&mut self) -> Result<u64, RunnerError> {
        let mut count = 0;
        while let Some(item) = self.next_line().await {
            let line = item?;
            debug!(program = %self.program, source = %line.source, "{}", line.text);
            count += 1;
        }
        Ok(count)
    }

    /// Kills the process and waits up to `grace` for it to be reaped.
    ///
    /// Returns `true` when the process is known to be gone.
    pub async fn terminate(&mut self, grace: Duration) -> bool {
        if self.finished {
            return true;
        }
        info!(program = %self.program, pid = self.child.id(), "Terminating external program");
        self.finished = true;
        // Fails only when the process was already reaped.
        let _ = self.child.start_kill();
        self.reap(grace).await
    }

    async fn finish(&mut self) -> Option<Result<OutputLine, RunnerError>> {
        let waited = match self.deadline {
            Some(deadline) => match timeout_at(deadline, self.child.wait()).await {
                Ok(waited) => waited,
                Err(_) => return self.expire().await,
            },
            None => self.child.wait().await,
        };
        self.finished = true;

        let status = match waited {
            Ok(status) => status,
            Err(e) => {
                return Some(Err(RunnerError::Wait {
                    program: self.program.clone(),
                    source: e,
                }))
            }
        };

        if status.success() {
            info!(
                program = %self.program,
                forwarded = self.forwarded,
                suppressed = self.suppressed,
                "External program finished"
            );
            None
        } else {
            warn!(program = %self.program, %status, "External program failed");
            Some(Err(RunnerError::Exit {
                program: self.program.clone(),
                status: status.to_string(),
                code: status.code(),
            }))
        }
    }

    async fn expire(&mut self) -> Option<Result<OutputLine, RunnerError>> {
        let timeout_secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
        self.fail_with(RunnerError::Timeout {
            program: self.program.clone(),
            timeout_secs,
        })
        .await
    }

    /// Kills the process, reaps it and yields `error`.
    async fn fail_with(&mut self, error: RunnerError) -> Option<Result<OutputLine, RunnerError>> {
        warn!(program = %self.program, kind = error.kind(), "Stopping external program: {}", error);
        self.finished = true;
        self.failure = Some(error);
        let _ = self.child.start_kill();
        self.reap(KILL_GRACE).await;
        self.failure.take().map(Err)
    }

    async fn reap(&mut self, grace: Duration) -> bool {
        match timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(program = %self.program, %status, "External program reaped");
                true
            }
            Ok(Err(e)) => {
                warn!(program = %self.program, "Failed to reap external program: {}", e);
                false
            }
            Err(_) => {
                warn!(program = %self.program, "External program did not exit within {:?}", grace);
                false
            }
        }
    }
}
