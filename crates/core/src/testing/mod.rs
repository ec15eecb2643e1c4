//! Testing utilities and mock implementations.
//!
//! # Example
//!
//! ```rust,ignore
//! use vidscope_core::testing::{fixtures, MockTranscoder};
//!
//! let transcoder = Arc::new(MockTranscoder::new());
//! let script = fixtures::write_script(dir.path(), "detect.sh", "echo frame 1\n");
//! ```

mod mock_transcoder;

pub use mock_transcoder::{MockTranscoder, RecordedTranscode, MOCK_OUTPUT};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::config::{Config, Isolation};

    /// Write an executable shell script standing in for the analysis program.
    ///
    /// The script gets its source as `$1` and its run directory as `$2`.
    #[cfg(unix)]
    pub fn write_script(dir: &Path, name: &str, body: &str) -> std::io::Result<PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}", body))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    /// Config whose analysis program is `script`, writing under `root/runs`
    /// and publishing into `root/static`.
    pub fn script_config(root: &Path, script: &Path, isolation: Isolation) -> Config {
        let mut config = Config::default();
        config.analysis.program = script.to_path_buf();
        config.analysis.working_dir = root.to_path_buf();
        config.analysis.output_root = root.join("runs");
        config.analysis.args = vec![
            "{source}".to_string(),
            "{output_root}/{run_name}".to_string(),
        ];
        config.storage.static_dir = root.join("static");
        config.storage.isolation = isolation;
        config.session.client_send_timeout_secs = 5;
        config.session.kill_grace_secs = 2;
        config
    }
}
