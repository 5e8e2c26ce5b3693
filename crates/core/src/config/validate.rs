use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - At least one job may run at a time
/// - Cancellation has a non-zero grace period
/// - Updater retries and check interval are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Scheduler validation
    if config.scheduler.max_concurrent_jobs == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.max_concurrent_jobs must be at least 1".to_string(),
        ));
    }
    if config.scheduler.cancel_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.cancel_timeout_ms cannot be 0".to_string(),
        ));
    }

    // Updater validation
    if config.updater.max_retries == 0 {
        return Err(ConfigError::ValidationError(
            "updater.max_retries must be at least 1".to_string(),
        ));
    }
    if config.updater.check_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "updater.check_interval_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_concurrency_fails() {
        let mut config = Config::default();
        config.scheduler.max_concurrent_jobs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("max_concurrent_jobs"));
    }

    #[test]
    fn test_validate_zero_cancel_timeout_fails() {
        let mut config = Config::default();
        config.scheduler.cancel_timeout_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_updater_limits() {
        let mut config = Config::default();
        config.updater.max_retries = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.updater.check_interval_secs = 0;
        assert!(validate_config(&config).is_err());
    }
}
