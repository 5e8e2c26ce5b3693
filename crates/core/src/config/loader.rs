use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;
use tracing::warn;

use super::{types::Config, ConfigError};

/// Environment prefix; nested keys use `__`, e.g. `REELHAUL_SCHEDULER__MAX_CONCURRENT_JOBS`.
const ENV_PREFIX: &str = "REELHAUL_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    extract(Figment::new().merge(Toml::file(path)))
}

/// Like [`load_config`], but a missing file means built-in defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        return load_config(path);
    }

    warn!(
        "Configuration file {} not found, using defaults",
        path.display()
    );
    extract(Figment::new())
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn extract(figment: Figment) -> Result<Config, ConfigError> {
    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[server]
port = 9000
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_load_config_from_str_wrong_type() {
        let toml = r#"
[scheduler]
max_concurrent_jobs = "many"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[server]
host = "127.0.0.1"
port = 3000
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
[scheduler]
max_concurrent_jobs = 2
"#,
            )?;
            jail.set_env("REELHAUL_SCHEDULER__MAX_CONCURRENT_JOBS", "6");
            jail.set_env("REELHAUL_UPDATER__ENABLED", "true");

            let config = load_config(Path::new("config.toml")).unwrap();
            assert_eq!(config.scheduler.max_concurrent_jobs, 6);
            assert!(config.updater.enabled);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("REELHAUL_SERVER__PORT", "9191");

            let config = load_config_or_default(Path::new("absent.toml")).unwrap();
            assert_eq!(config.server.port, 9191);
            assert_eq!(config.scheduler.max_concurrent_jobs, 2);
            Ok(())
        });
    }
}
