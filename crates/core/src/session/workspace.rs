//! Where each job writes its run and its result.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::error::JobError;
use crate::config::{Isolation, StorageConfig};

/// Paths and names for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPlan {
    pub job_id: String,
    /// Name handed to the analysis program for its run directory.
    pub run_name: String,
    /// `<output_root>/<run_name>`.
    pub run_dir: PathBuf,
    /// Transcoder output.
    pub destination: PathBuf,
    /// Client-facing reference to `destination`.
    pub video_url: String,
    /// Whether `run_dir` belongs to this job alone.
    pub private_run: bool,
}

/// Hands out job paths according to the configured isolation.
///
/// Clones share the lock used in shared isolation.
#[derive(Debug, Clone)]
pub struct Workspace {
    storage: StorageConfig,
    output_root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl Workspace {
    pub fn new(storage: StorageConfig, output_root: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            output_root: output_root.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn isolation(&self) -> Isolation {
        self.storage.isolation
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Paths for job number `seq` of `session_id`.
    pub fn plan(&self, session_id: &str, seq: u64) -> JobPlan {
        let job_id = format!("{}-{}", session_id, seq);

        let (run_name, file_name, private_run) = match self.storage.isolation {
            Isolation::PerSession => (job_id.clone(), self.session_output_name(session_id), true),
            Isolation::Shared => (
                self.storage.shared_run_name.clone(),
                self.storage.shared_output_name.clone(),
                false,
            ),
        };

        JobPlan {
            run_dir: self.output_root.join(&run_name),
            destination: self.storage.static_dir.join(&file_name),
            video_url: format!("{}/{}", self.storage.url_prefix.trim_end_matches('/'), file_name),
            job_id,
            run_name,
            private_run,
        }
    }

    /// Result file name of a session in per-session isolation.
    fn session_output_name(&self, session_id: &str) -> String {
        let extension = Path::new(&self.storage.shared_output_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        format!("{}.{}", session_id, extension)
    }

    /// Serializes jobs in shared isolation; `None` when jobs are isolated anyway.
    pub async fn acquire(&self) -> Option<OwnedMutexGuard<()>> {
        match self.storage.isolation {
            Isolation::PerSession => None,
            Isolation::Shared => Some(Arc::clone(&self.lock).lock_owned().await),
        }
    }

    /// Removes what a previous run left in the job's run directory.
    pub async fn prepare(&self, plan: &JobPlan) -> Result<(), JobError> {
        match tokio::fs::remove_dir_all(&plan.run_dir).await {
            Ok(()) => {
                debug!(path = %plan.run_dir.display(), "Removed stale run directory");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(JobError::Workspace {
                path: plan.run_dir.clone(),
                source: e,
            }),
        }
    }

    /// Deletes the result a closed session left in the static directory.
    ///
    /// Shared results are overwritten by the next job and stay in place.
    pub async fn release(&self, session_id: &str) {
        if self.storage.isolation != Isolation::PerSession {
            return;
        }
        let path = self.storage.static_dir.join(self.session_output_name(session_id));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "Removed session result"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "Failed to remove session result: {}", e),
        }
    }

    /// Deletes a private run directory once its job is over.
    pub async fn cleanup(&self, plan: &JobPlan) {
        if !plan.private_run || !self.storage.cleanup_runs {
            return;
        }
        match tokio::fs::remove_dir_all(&plan.run_dir).await {
            Ok(()) => debug!(path = %plan.run_dir.display(), "Removed run directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %plan.run_dir.display(), "Failed to remove run directory: {}", e),
        }
    }
}
