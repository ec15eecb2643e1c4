//! Types shared by the multiplexer and the job runner.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of combined process output, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub text: String,
    pub source: StreamSource,
}

impl OutputLine {
    pub fn new(text: impl Into<String>, source: StreamSource) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }
}

/// Substring predicate for lines that are recorded but not forwarded.
#[derive(Debug, Clone, Default)]
pub struct LineFilter {
    patterns: Vec<String>,
}

impl LineFilter {
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    /// A filter that lets every line through.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn matches(&self, line: &str) -> bool {
        self.patterns.iter().any(|p| line.contains(p.as_str()))
    }
}

/// Everything needed to start one external program.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub working_dir: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub filter: LineFilter,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
            args: Vec::new(),
            envs: Vec::new(),
            filter: LineFilter::none(),
            timeout: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn with_filter(mut self, filter: LineFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program name as shown in logs and errors.
    pub fn display_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}
