pub mod analyzer;
pub mod config;
pub mod locator;
pub mod metrics;
pub mod runner;
pub mod session;
pub mod testing;
pub mod transcoder;

pub use analyzer::Analyzer;
pub use config::{
    load_config, load_config_from_str, validate_config, AnalysisConfig, Config, ConfigError,
    Isolation, ServerConfig, SessionConfig, StorageConfig, TranscodeConfig,
};
pub use locator::{locate, LocateError, LocateStrategy};
pub use runner::{run, CommandSpec, LineFilter, OutputLine, RunnerError, RunningJob, StreamSource};
pub use session::{
    JobError, JobRequest, JobStage, ServerMessage, SessionContext, SessionController,
    SessionError, SessionPhase, SessionSummary,
};
pub use transcoder::{FfmpegTranscoder, TranscodeError, TranscodeJob, TranscodeResult, Transcoder};
