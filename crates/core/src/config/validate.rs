use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Worker pools are at least 1
/// - Segmentation settings are usable
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.pipeline.separation_workers == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.separation_workers must be at least 1".to_string(),
        ));
    }

    if config.queue.download_workers == 0 {
        return Err(ConfigError::ValidationError(
            "queue.download_workers must be at least 1".to_string(),
        ));
    }

    if config.queue.batch_workers == 0 {
        return Err(ConfigError::ValidationError(
            "queue.batch_workers must be at least 1".to_string(),
        ));
    }

    if config.separator.demucs_workers == 0 {
        return Err(ConfigError::ValidationError(
            "separator.demucs_workers must be at least 1".to_string(),
        ));
    }

    if config.separator.segment_len_secs == 0.0 {
        return Err(ConfigError::ValidationError(
            "separator.segment_len_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}
