//! Builds the analysis command and reads hints from its output.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::AnalysisConfig;
use crate::locator::LocateStrategy;
use crate::runner::{CommandSpec, LineFilter};

static ANSI_ESCAPE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").ok());

static RESULTS_SAVED: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"Results saved to\s+(.+?)\s*$").ok());

/// Prepares invocations of the external detector.
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Command for one analysis run of `source`, writing under `run_name`.
    pub fn command(&self, source: &str, run_name: &str) -> CommandSpec {
        let output_root = self.config.output_root.display().to_string();
        let args = self.config.args.iter().map(|arg| {
            arg.replace("{source}", source)
                .replace("{output_root}", &output_root)
                .replace("{run_name}", run_name)
        });

        CommandSpec::new(&self.config.program, &self.config.working_dir)
            .with_args(args)
            .with_filter(LineFilter::new(self.config.suppress_patterns.iter().cloned()))
            .with_timeout(self.config.timeout_secs.map(Duration::from_secs))
    }

    pub fn artifact_extension(&self) -> &str {
        &self.config.artifact_extension
    }

    pub fn locate_strategy(&self) -> LocateStrategy {
        self.config.locate_strategy
    }

    /// Output directory announced by the program itself, if `line` carries one.
    ///
    /// Relative paths are resolved against the working directory.
    pub fn results_hint(&self, line: &str) -> Option<PathBuf> {
        let plain = strip_ansi(line);
        let re = RESULTS_SAVED.as_ref()?;
        let dir = re.captures(&plain)?.get(1)?.as_str();
        let dir = Path::new(dir);
        if dir.is_absolute() {
            Some(dir.to_path_buf())
        } else {
            Some(self.config.working_dir.join(dir))
        }
    }
}

/// Removes terminal colour sequences.
pub fn strip_ansi(line: &str) -> String {
    match ANSI_ESCAPE.as_ref() {
        Some(re) => re.replace_all(line, "").into_owned(),
        None => line.to_string(),
    }
}
