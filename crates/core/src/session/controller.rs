//! Drives one client connection through its jobs.
//!
//! For each request the controller runs the analysis program while relaying
//! its output, locates the artifact, transcodes it and reports where the result
//! lives. Jobs run strictly one after another; requests that arrive meanwhile
//! are queued.

use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::error::{JobError, SessionError};
use super::messages::{JobRequest, ServerMessage};
use super::phase::SessionPhase;
use super::workspace::{JobPlan, Workspace};
use crate::analyzer::Analyzer;
use crate::config::{Config, Isolation, SessionConfig};
use crate::locator::locate;
use crate::metrics::{JOBS_TOTAL, LINES_FORWARDED, STAGE_DURATION};
use crate::runner::{run, OutputLine, RunnerError};
use crate::transcoder::{TranscodeJob, Transcoder};

/// Everything sessions share.
pub struct SessionContext {
    pub analyzer: Analyzer,
    pub transcoder: Arc<dyn Transcoder>,
    pub workspace: Workspace,
    pub session: SessionConfig,
}

impl SessionContext {
    pub fn from_config(config: &Config, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            analyzer: Analyzer::new(config.analysis.clone()),
            transcoder,
            workspace: Workspace::new(config.storage.clone(), config.analysis.output_root.clone()),
            session: config.session.clone(),
        }
    }

    fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.session.kill_grace_secs)
    }

    fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.session.client_send_timeout_secs)
    }
}

/// Job counts for one finished session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub jobs_started: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
}

/// Why a job stopped before reporting a result.
enum Abort {
    Failed(JobError),
    Disconnected,
    Fatal(SessionError),
}

impl From<JobError> for Abort {
    fn from(e: JobError) -> Self {
        Self::Failed(e)
    }
}

impl From<SessionError> for Abort {
    fn from(e: SessionError) -> Self {
        Self::Fatal(e)
    }
}

enum Event {
    Line(Option<Result<OutputLine, RunnerError>>),
    Inbound(Option<JobRequest>),
}

/// Owns the state of one client connection.
pub struct SessionController {
    id: String,
    context: Arc<SessionContext>,
    outbound: mpsc::Sender<ServerMessage>,
    phase: SessionPhase,
    pending: VecDeque<JobRequest>,
    next_seq: u64,
    summary: SessionSummary,
}

impl SessionController {
    /// `outbound` is drained by the connection writer.
    pub fn new(context: Arc<SessionContext>, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            context,
            outbound,
            phase: SessionPhase::Idle,
            pending: VecDeque::new(),
            next_seq: 0,
            summary: SessionSummary::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queues a request to run before anything read from the connection.
    pub fn enqueue(&mut self, request: JobRequest) {
        if request.locator().is_none() {
            debug!("Ignoring request without a source locator");
            return;
        }
        self.pending.push_back(request);
    }

    /// Serves requests until `inbound` ends or the client can no longer be written to.
    pub async fn run<S>(mut self, mut inbound: S) -> Result<SessionSummary, SessionError>
    where
        S: Stream<Item = JobRequest> + Unpin,
    {
        let span = info_span!("session", id = %self.id);
        async move {
            info!("Session started");
            let result = self.serve(&mut inbound).await;
            self.phase = SessionPhase::Closed;
            self.context.workspace.release(&self.id).await;
            match &result {
                Ok(summary) => info!(
                    started = summary.jobs_started,
                    succeeded = summary.jobs_succeeded,
                    failed = summary.jobs_failed,
                    "Session closed"
                ),
                Err(e) => warn!("Session ended: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn serve<S>(&mut self, inbound: &mut S) -> Result<SessionSummary, SessionError>
    where
        S: Stream<Item = JobRequest> + Unpin,
    {
        loop {
            let request = match self.pending.pop_front() {
                Some(request) => request,
                None => match inbound.next().await {
                    Some(request) => request,
                    None => break,
                },
            };
            let Some(locator) = request.locator() else {
                debug!("Ignoring request without a source locator");
                continue;
            };

            self.next_seq += 1;
            self.summary.jobs_started += 1;
            let plan = self.context.workspace.plan(&self.id, self.next_seq);
            info!(job_id = %plan.job_id, source = %locator, "Job started");

            let outcome = self.execute(&plan, locator, inbound).await;
            self.context.workspace.cleanup(&plan).await;

            match outcome {
                Ok(()) => {
                    self.summary.jobs_succeeded += 1;
                    JOBS_TOTAL.with_label_values(&["completed"]).inc();
                    info!(job_id = %plan.job_id, video_url = %plan.video_url, "Job finished");
                }
                Err(Abort::Failed(e)) => {
                    self.summary.jobs_failed += 1;
                    let stage = e.stage();
                    let outcome = format!("{}_failed", stage);
                    JOBS_TOTAL.with_label_values(&[outcome.as_str()]).inc();
                    warn!(job_id = %plan.job_id, %stage, "Job failed: {}", e);
                    self.send(ServerMessage::Failure {
                        stage,
                        error: e.to_string(),
                    })
                    .await?;
                    if self.phase != SessionPhase::Idle {
                        self.transition(SessionPhase::Idle)?;
                    }
                }
                Err(Abort::Disconnected) => {
                    JOBS_TOTAL.with_label_values(&["abandoned"]).inc();
                    info!(job_id = %plan.job_id, phase = %self.phase, "Client left during job");
                    self.transition(SessionPhase::Closed)?;
                    return Ok(self.summary.clone());
                }
                Err(Abort::Fatal(e)) => {
                    JOBS_TOTAL.with_label_values(&["abandoned"]).inc();
                    return Err(e);
                }
            }
        }

        self.transition(SessionPhase::Closed)?;
        Ok(self.summary.clone())
    }

    /// One full cycle: analyze, locate, transcode, report.
    async fn execute<S>(&mut self, plan: &JobPlan, locator: &str, inbound: &mut S) -> Result<(), Abort>
    where
        S: Stream<Item = JobRequest> + Unpin,
    {
        let context = Arc::clone(&self.context);
        let _guard = self.watch(inbound, context.workspace.acquire(), None).await?;
        context.workspace.prepare(plan).await?;

        self.transition(SessionPhase::Analyzing)?;
        let started = Instant::now();
        let hint = self.analyze(&context, plan, locator, inbound).await;
        observe("analysis", started);
        let hint = hint?;
        self.send(ServerMessage::Completed).await?;

        self.transition(SessionPhase::Locating)?;
        let started = Instant::now();
        let root = locate_root(&context, plan, hint).await;
        debug!(root = %root.display(), "Searching for artifact");
        let artifact = self
            .watch(
                inbound,
                locate(
                    &root,
                    context.analyzer.artifact_extension(),
                    context.analyzer.locate_strategy(),
                ),
                None,
            )
            .await?;
        observe("locate", started);
        let artifact = artifact.map_err(JobError::Locate)?;

        self.transition(SessionPhase::Transcoding)?;
        let started = Instant::now();
        let job = TranscodeJob {
            job_id: plan.job_id.clone(),
            input_path: artifact,
            output_path: plan.destination.clone(),
        };
        let cancel = CancellationToken::new();
        let transcoded = self
            .watch(
                inbound,
                context.transcoder.transcode(job, cancel.clone()),
                Some(&cancel),
            )
            .await?;
        observe("transcode", started);
        let transcoded = transcoded.map_err(JobError::Transcode)?;
        debug!(
            size = transcoded.output_size_bytes,
            duration_ms = transcoded.duration_ms,
            "Result ready"
        );

        self.transition(SessionPhase::Reporting)?;
        self.send(ServerMessage::Result {
            video_url: plan.video_url.clone(),
        })
        .await?;
        self.transition(SessionPhase::Idle)?;
        Ok(())
    }

    /// Runs the analysis program and relays its output.
    ///
    /// Returns the output directory the program announced, if any.
    async fn analyze<S>(
        &mut self,
        context: &SessionContext,
        plan: &JobPlan,
        locator: &str,
        inbound: &mut S,
    ) -> Result<Option<PathBuf>, Abort>
    where
        S: Stream<Item = JobRequest> + Unpin,
    {
        let spec = context.analyzer.command(locator, &plan.run_name);
        let mut job = run(&spec).map_err(JobError::Analysis)?;
        let mut hint = None;

        loop {
            let event = tokio::select! {
                line = job.next_line() => Event::Line(line),
                request = inbound.next() => Event::Inbound(request),
            };

            match event {
                Event::Line(Some(Ok(line))) => {
                    if let Some(dir) = context.analyzer.results_hint(&line.text) {
                        debug!(dir = %dir.display(), "Program reported its output directory");
                        hint = Some(dir);
                    }
                    LINES_FORWARDED.inc();
                    if let Err(e) = self.send(ServerMessage::Progress { line: line.text }).await {
                        job.terminate(context.kill_grace()).await;
                        return Err(e.into());
                    }
                }
                Event::Line(Some(Err(e))) => return Err(JobError::Analysis(e).into()),
                Event::Line(None) => {
                    debug!(
                        forwarded = job.forwarded_count(),
                        suppressed = job.suppressed_count(),
                        "Analysis output drained"
                    );
                    return Ok(hint);
                }
                Event::Inbound(Some(request)) => self.enqueue(request),
                Event::Inbound(None) => {
                    job.terminate(context.kill_grace()).await;
                    return Err(Abort::Disconnected);
                }
            }
        }
    }

    /// Awaits `fut` while queueing requests that arrive meanwhile.
    ///
    /// On disconnect, `cancel` is fired and `fut` gets the kill grace (plus a
    /// second) to wind down; without a token `fut` is dropped, which kills any
    /// process it started.
    async fn watch<S, F>(
        &mut self,
        inbound: &mut S,
        fut: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<F::Output, Abort>
    where
        S: Stream<Item = JobRequest> + Unpin,
        F: Future,
    {
        tokio::pin!(fut);
        loop {
            let request = tokio::select! {
                output = &mut fut => return Ok(output),
                request = inbound.next() => request,
            };
            match request {
                Some(request) => self.enqueue(request),
                None => {
                    if let Some(cancel) = cancel {
                        cancel.cancel();
                        let grace = self.context.kill_grace() + Duration::from_secs(1);
                        if timeout(grace, &mut fut).await.is_err() {
                            warn!("Cancelled stage did not finish within {:?}", grace);
                        }
                    }
                    return Err(Abort::Disconnected);
                }
            }
        }
    }

    async fn send(&self, message: ServerMessage) -> Result<(), SessionError> {
        let wait = self.context.send_timeout();
        match timeout(wait, self.outbound.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SessionError::Connection("client writer closed".to_string())),
            Err(_) => Err(SessionError::Connection(format!(
                "client did not accept a message within {} seconds",
                wait.as_secs()
            ))),
        }
    }

    fn transition(&mut self, to: SessionPhase) -> Result<(), SessionError> {
        if !self.phase.can_transition_to(to) {
            return Err(SessionError::Phase {
                from: self.phase,
                to,
            });
        }
        debug!(from = %self.phase, to = %to, "Phase transition");
        self.phase = to;
        Ok(())
    }
}

/// Directory to search for the artifact.
///
/// Prefers the directory the program announced, then the job's run directory.
/// An announced directory is only trusted inside the job's run directory
/// (per-session isolation) or the output root (shared isolation). Shared
/// isolation falls back to the whole output root when the program picked its
/// own run name.
async fn locate_root(context: &SessionContext, plan: &JobPlan, hint: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = hint {
        let bound = match context.workspace.isolation() {
            Isolation::PerSession => plan.run_dir.as_path(),
            Isolation::Shared => context.workspace.output_root(),
        };
        if is_within(&dir, bound).await {
            return dir;
        }
        debug!(
            dir = %dir.display(),
            bound = %bound.display(),
            "Ignoring reported output directory outside the job's area"
        );
    }
    if context.workspace.isolation() == Isolation::Shared && !is_dir(&plan.run_dir).await {
        return context.workspace.output_root().to_path_buf();
    }
    plan.run_dir.clone()
}

/// Whether `dir` is an existing directory at or below `bound`, symlinks resolved.
async fn is_within(dir: &Path, bound: &Path) -> bool {
    if !is_dir(dir).await {
        return false;
    }
    match (
        tokio::fs::canonicalize(dir).await,
        tokio::fs::canonicalize(bound).await,
    ) {
        (Ok(dir), Ok(bound)) => dir.starts_with(bound),
        _ => false,
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

fn observe(stage: &str, started: Instant) {
    STAGE_DURATION
        .with_label_values(&[stage])
        .observe(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::testing::MockTranscoder;
    use futures::stream;

    fn context(output_root: PathBuf) -> Arc<SessionContext> {
        let mut config = Config::default();
        config.analysis.output_root = output_root;
        Arc::new(SessionContext::from_config(
            &config,
            Arc::new(MockTranscoder::new()),
        ))
    }

    #[tokio::test]
    async fn test_no_requests_closes_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let controller = SessionController::new(context(dir.path().to_path_buf()), tx);

        let summary = controller.run(stream::empty::<JobRequest>()).await.unwrap();
        assert_eq!(summary, SessionSummary::default());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_blank_requests_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let controller = SessionController::new(context(dir.path().to_path_buf()), tx);

        let requests = vec![JobRequest::default(), JobRequest::new("   ")];
        let summary = controller.run(stream::iter(requests)).await.unwrap();
        assert_eq!(summary.jobs_started, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_locate_root_prefers_existing_hint() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path().to_path_buf());
        let plan = ctx.workspace.plan("s", 1);

        let hinted = plan.run_dir.join("predict2");
        std::fs::create_dir_all(&hinted).unwrap();
        assert_eq!(locate_root(&ctx, &plan, Some(hinted.clone())).await, hinted);

        let missing = plan.run_dir.join("missing");
        assert_eq!(locate_root(&ctx, &plan, Some(missing)).await, plan.run_dir);
    }

    #[tokio::test]
    async fn test_locate_root_rejects_hint_outside_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path().to_path_buf());
        let plan = ctx.workspace.plan("s", 1);
        std::fs::create_dir_all(&plan.run_dir).unwrap();

        // Another session's run directory.
        let foreign = ctx.workspace.plan("other", 1).run_dir;
        std::fs::create_dir_all(&foreign).unwrap();
        assert_eq!(locate_root(&ctx, &plan, Some(foreign)).await, plan.run_dir);

        // Escaping through `..` is resolved before comparing.
        let escaping = plan.run_dir.join("..").join("other-1");
        assert_eq!(locate_root(&ctx, &plan, Some(escaping)).await, plan.run_dir);

        let outside = tempfile::tempdir().unwrap();
        assert_eq!(
            locate_root(&ctx, &plan, Some(outside.path().to_path_buf())).await,
            plan.run_dir
        );
    }

    #[tokio::test]
    async fn test_shared_locate_root_falls_back_to_output_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.analysis.output_root = dir.path().to_path_buf();
        config.storage = StorageConfig {
            isolation: Isolation::Shared,
            ..Default::default()
        };
        let ctx = SessionContext::from_config(&config, Arc::new(MockTranscoder::new()));
        let plan = ctx.workspace.plan("s", 1);

        assert_eq!(locate_root(&ctx, &plan, None).await, dir.path());
        std::fs::create_dir_all(&plan.run_dir).unwrap();
        assert_eq!(locate_root(&ctx, &plan, None).await, plan.run_dir);

        // Any directory under the output root may be announced.
        let renamed = dir.path().join("predict3");
        std::fs::create_dir_all(&renamed).unwrap();
        assert_eq!(locate_root(&ctx, &plan, Some(renamed.clone())).await, renamed);

        let outside = tempfile::tempdir().unwrap();
        assert_eq!(
            locate_root(&ctx, &plan, Some(outside.path().to_path_buf())).await,
            plan.run_dir
        );
    }
}
