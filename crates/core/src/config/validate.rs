use super::{types::Config, ConfigError};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.analysis.program.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "analysis.program cannot be empty".to_string(),
        ));
    }

    if !config.analysis.args.iter().any(|a| a.contains("{source}")) {
        return Err(ConfigError::ValidationError(
            "analysis.args must reference {source}".to_string(),
        ));
    }

    if config.analysis.artifact_extension.trim_start_matches('.').is_empty() {
        return Err(ConfigError::ValidationError(
            "analysis.artifact_extension cannot be empty".to_string(),
        ));
    }

    if config.transcode.program.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "transcode.program cannot be empty".to_string(),
        ));
    }

    for (name, timeout) in [
        ("analysis.timeout_secs", config.analysis.timeout_secs),
        ("transcode.timeout_secs", config.transcode.timeout_secs),
    ] {
        if timeout == Some(0) {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be 0",
                name
            )));
        }
    }

    if config.session.channel_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "session.channel_capacity cannot be 0".to_string(),
        ));
    }

    if config.storage.shared_output_name.is_empty() || config.storage.shared_run_name.is_empty() {
        return Err(ConfigError::ValidationError(
            "storage.shared_run_name and storage.shared_output_name cannot be empty".to_string(),
        ));
    }

    let prefix = config.storage.url_prefix.trim_end_matches('/');
    if !prefix.starts_with('/') {
        return Err(ConfigError::ValidationError(
            "storage.url_prefix must start with '/' and name a path below the root".to_string(),
        ));
    }

    Ok(())
}
