use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::locator::LocateStrategy;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// External analysis program (the detector).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// Program name or path.
    #[serde(default = "default_analysis_program")]
    pub program: PathBuf,
    /// Working directory the program is started in.
    #[serde(default = "default_analysis_working_dir")]
    pub working_dir: PathBuf,
    /// Argument template. Supports `{source}`, `{output_root}` and `{run_name}`.
    #[serde(default = "default_analysis_args")]
    pub args: Vec<String>,
    /// Directory under which the program writes its runs.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Extension of the media file the program produces.
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
    /// Output lines containing any of these substrings are not forwarded to clients.
    #[serde(default = "default_suppress_patterns")]
    pub suppress_patterns: Vec<String>,
    /// How the produced artifact is picked when several match.
    #[serde(default)]
    pub locate_strategy: LocateStrategy,
    /// Optional upper bound on the analysis run.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_analysis_program() -> PathBuf {
    PathBuf::from("yolo")
}

fn default_analysis_working_dir() -> PathBuf {
    PathBuf::from("/usr/src/ultralytics")
}

fn default_analysis_args() -> Vec<String> {
    [
        "detect",
        "predict",
        "model=/server/best.pt",
        "source={source}",
        "conf=0.70",
        "imgsz=640",
        "project={output_root}",
        "name={run_name}",
        "exist_ok=True",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_output_root() -> PathBuf {
    PathBuf::from("/usr/src/ultralytics/runs/detect")
}

fn default_artifact_extension() -> String {
    "avi".to_string()
}

fn default_suppress_patterns() -> Vec<String> {
    vec!["WARNING".to_string()]
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            program: default_analysis_program(),
            working_dir: default_analysis_working_dir(),
            args: default_analysis_args(),
            output_root: default_output_root(),
            artifact_extension: default_artifact_extension(),
            suppress_patterns: default_suppress_patterns(),
            locate_strategy: LocateStrategy::default(),
            timeout_secs: None,
        }
    }
}

/// External transcoder (ffmpeg).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub program: PathBuf,
    #[serde(default = "default_transcode_working_dir")]
    pub working_dir: PathBuf,
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_crf")]
    pub crf: u8,
    /// Extra arguments placed right before the output path.
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// How long to wait for a cancelled transcode to be reaped.
    #[serde(default = "default_kill_grace")]
    pub kill_grace_secs: u64,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_transcode_working_dir() -> PathBuf {
    PathBuf::from("/server")
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_profile() -> String {
    "high".to_string()
}

fn default_crf() -> u8 {
    28
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            program: default_ffmpeg_path(),
            working_dir: default_transcode_working_dir(),
            video_codec: default_video_codec(),
            profile: default_profile(),
            crf: default_crf(),
            extra_args: Vec::new(),
            timeout_secs: None,
            kill_grace_secs: default_kill_grace(),
        }
    }
}

/// How sessions share the output root and the result destination.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Each job gets its own run directory, each session its own result file.
    #[default]
    PerSession,
    /// Fixed run directory and result file, guarded by a process-wide lock.
    Shared,
}

/// Where results land and how they are addressed by clients.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory served read-only under `url_prefix`.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
    #[serde(default)]
    pub isolation: Isolation,
    /// Run name used in shared isolation.
    #[serde(default = "default_shared_run_name")]
    pub shared_run_name: String,
    /// Result file name used in shared isolation.
    #[serde(default = "default_shared_output_name")]
    pub shared_output_name: String,
    /// Remove a job's run directory once the job is over (per-session isolation only).
    #[serde(default = "default_cleanup_runs")]
    pub cleanup_runs: bool,
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./static")
}

fn default_url_prefix() -> String {
    "/static".to_string()
}

fn default_shared_run_name() -> String {
    "predict".to_string()
}

fn default_shared_output_name() -> String {
    "output.mp4".to_string()
}

fn default_cleanup_runs() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            static_dir: default_static_dir(),
            url_prefix: default_url_prefix(),
            isolation: Isolation::default(),
            shared_run_name: default_shared_run_name(),
            shared_output_name: default_shared_output_name(),
            cleanup_runs: default_cleanup_runs(),
        }
    }
}

/// Per-connection behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Capacity of the queue between the job and the connection writer.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// A client that does not take a message within this window is dropped.
    #[serde(default = "default_client_send_timeout")]
    pub client_send_timeout_secs: u64,
    /// How long to wait for a killed process to be reaped.
    #[serde(default = "default_kill_grace")]
    pub kill_grace_secs: u64,
}

fn default_channel_capacity() -> usize {
    256
}

fn default_client_send_timeout() -> u64 {
    30
}

fn default_kill_grace() -> u64 {
    5
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            client_send_timeout_secs: default_client_send_timeout(),
            kill_grace_secs: default_kill_grace(),
        }
    }
}
