//! Global `tracing` subscriber setup.

use crate::config::LogConfig;
use crate::errors::ConfigError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `config.level`. Output goes to stderr, either
/// human-readable or as JSON lines. Returns `false` if a subscriber was
/// already installed, in which case nothing changes.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` if `config.level` is not a valid filter.
pub fn init_logging(config: &LogConfig) -> Result<bool, ConfigError> {
    let filter = build_filter(config)?;

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(config.json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!config.json).then(|| fmt::layer().with_target(true).with_writer(std::io::stderr)))
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(level = %config.level, json = config.json, "Logging initialised");
    }
    Ok(installed)
}

/// Builds the filter from `RUST_LOG`, falling back to `config.level`.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` if `config.level` is not a valid filter.
pub fn build_filter(config: &LogConfig) -> Result<EnvFilter, ConfigError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ConfigError::Invalid(format!("log level '{}': {e}", config.level))),
    }
}

/// Installs a warn-level subscriber that writes through the test harness.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_directives() {
        let config = LogConfig {
            level: "clipflow=debug,warn".to_string(),
            json: false,
        };
        assert!(build_filter(&config).is_ok());
    }

    #[test]
    fn test_filter_rejects_garbage() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LogConfig {
            level: "clipflow=notalevel".to_string(),
            json: false,
        };
        assert!(matches!(build_filter(&config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_test_logging();
        assert!(!init_logging(&LogConfig::default()).unwrap());
    }
}
