//! Finds the media file an external program left behind.
//!
//! The analysis program picks its own file names, so the produced artifact is
//! discovered by walking its output directory for the expected extension.

use serde::{Deserialize, Serialize};
use std::fs::FileType;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

/// How to choose between several matching files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocateStrategy {
    /// First match in depth-first, name-ordered traversal.
    FirstFound,
    /// Most recently modified match; a tie for newest is an error.
    #[default]
    Newest,
}

/// Errors from [`locate`].
#[derive(Debug, Error)]
pub enum LocateError {
    /// A directory in the tree could not be read.
    #[error("Failed to walk {path}: {source}")]
    Walk { path: PathBuf, source: io::Error },

    /// The walk finished without a match.
    #[error("No .{extension} file found under {root}")]
    NotFound { root: PathBuf, extension: String },

    /// Several files share the newest modification time.
    #[error("Ambiguous artifact: {} files share the newest modification time", .candidates.len())]
    Ambiguous { candidates: Vec<PathBuf> },
}

/// Walks `root` and returns the artifact with the given extension.
pub async fn locate(
    root: &Path,
    extension: &str,
    strategy: LocateStrategy,
) -> Result<PathBuf, LocateError> {
    let extension = extension.trim_start_matches('.');
    let mut pending = read_sorted(root).await?;
    pending.reverse();

    let mut newest: Option<SystemTime> = None;
    let mut candidates: Vec<PathBuf> = Vec::new();

    while let Some((path, file_type)) = pending.pop() {
        if file_type.is_dir() {
            let mut children = read_sorted(&path).await?;
            children.reverse();
            pending.extend(children);
            continue;
        }

        if !file_type.is_file() || !has_extension(&path, extension) {
            continue;
        }

        debug!(path = %path.display(), "Found candidate artifact");

        if strategy == LocateStrategy::FirstFound {
            info!(path = %path.display(), "Located artifact");
            return Ok(path);
        }

        let modified = fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .map_err(|e| LocateError::Walk {
                path: path.clone(),
                source: e,
            })?;

        match newest {
            Some(current) if modified < current => {}
            Some(current) if modified == current => candidates.push(path),
            _ => {
                newest = Some(modified);
                candidates = vec![path];
            }
        }
    }

    match candidates.len() {
        0 => Err(LocateError::NotFound {
            root: root.to_path_buf(),
            extension: extension.to_string(),
        }),
        1 => {
            let path = candidates.remove(0);
            info!(path = %path.display(), "Located artifact");
            Ok(path)
        }
        _ => Err(LocateError::Ambiguous { candidates }),
    }
}

/// Directory entries sorted by file name.
async fn read_sorted(dir: &Path) -> Result<Vec<(PathBuf, FileType)>, LocateError> {
    let walk_err = |e: io::Error| LocateError::Walk {
        path: dir.to_path_buf(),
        source: e,
    };

    let mut entries = fs::read_dir(dir).await.map_err(walk_err)?;
    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(walk_err)? {
        let file_type = entry.file_type().await.map_err(walk_err)?;
        out.push((entry.path(), file_type));
    }
    out.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
    Ok(out)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(&path).unwrap();
        path
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[tokio::test]
    async fn test_single_nested_match() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "labels/frame_1.txt");
        let expected = touch(dir.path(), "a/b/c/d/out.avi");

        for strategy in [LocateStrategy::FirstFound, LocateStrategy::Newest] {
            let found = locate(dir.path(), "avi", strategy).await.unwrap();
            assert_eq!(found, expected);
        }
    }

    #[tokio::test]
    async fn test_no_match_is_not_found() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "predict/out.mp4");
        touch(dir.path(), "predict/out.avi.part");

        let err = locate(dir.path(), "avi", LocateStrategy::Newest)
            .await
            .unwrap_err();
        assert!(matches!(err, LocateError::NotFound { ref extension, .. } if extension == "avi"));
    }

    #[tokio::test]
    async fn test_missing_root_is_walk_failure() {
        let err = locate(
            Path::new("/nonexistent/runs/detect"),
            "avi",
            LocateStrategy::FirstFound,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LocateError::Walk { .. }));
    }

    #[tokio::test]
    async fn test_root_is_a_file_is_walk_failure() {
        let dir = TempDir::new().unwrap();
        let file = touch(dir.path(), "not-a-dir.avi");
        let err = locate(&file, "avi", LocateStrategy::Newest).await.unwrap_err();
        assert!(matches!(err, LocateError::Walk { .. }));
    }

    #[tokio::test]
    async fn test_extension_is_case_insensitive_and_dot_tolerant() {
        let dir = TempDir::new().unwrap();
        let expected = touch(dir.path(), "predict/OUT.AVI");
        let found = locate(dir.path(), ".avi", LocateStrategy::Newest).await.unwrap();
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn test_first_found_follows_name_order_depth_first() {
        let dir = TempDir::new().unwrap();
        let first = touch(dir.path(), "a/deep/x.avi");
        touch(dir.path(), "b.avi");
        touch(dir.path(), "c/y.avi");

        let found = locate(dir.path(), "avi", LocateStrategy::FirstFound)
            .await
            .unwrap();
        assert_eq!(found, first);
    }

    #[tokio::test]
    async fn test_newest_wins() {
        let dir = TempDir::new().unwrap();
        let old = touch(dir.path(), "predict/old.avi");
        let fresh = touch(dir.path(), "predict2/fresh.avi");
        let now = SystemTime::now();
        set_mtime(&old, now - Duration::from_secs(3600));
        set_mtime(&fresh, now);

        let found = locate(dir.path(), "avi", LocateStrategy::Newest).await.unwrap();
        assert_eq!(found, fresh);
    }

    #[tokio::test]
    async fn test_tie_for_newest_is_ambiguous() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "a.avi");
        let b = touch(dir.path(), "sub/b.avi");
        let older = touch(dir.path(), "sub/c.avi");
        let now = SystemTime::now();
        set_mtime(&a, now);
        set_mtime(&b, now);
        set_mtime(&older, now - Duration::from_secs(60));

        match locate(dir.path(), "avi", LocateStrategy::Newest).await {
            Err(LocateError::Ambiguous { candidates }) => {
                assert_eq!(candidates, vec![a, b]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }
}
