//! Tracing subscriber setup.
//!
//! `log` records from the database layer are bridged into tracing so they
//! share span context with the queue and processor events.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::ConfigError;

/// Third-party targets that are noisy at `info`.
const QUIET_TARGETS: &[(&str, &str)] = &[("hyper", "warn"), ("reqwest", "warn"), ("h2", "warn")];

/// Builds the filter: `RUST_LOG` when set, otherwise the configured level
/// plus the quiet-target overrides.
pub fn build_env_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = std::iter::once(level.to_string())
        .chain(QUIET_TARGETS.iter().map(|(t, l)| format!("{}={}", t, l)))
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::try_new(&directives)
        .map_err(|e| ConfigError::Logging(format!("invalid filter '{}': {}", directives, e)))
}

/// Installs the global subscriber and the `log` bridge. Fails if a
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = build_env_filter(&config.level)?;
    let layer = match config.format {
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(layer.with_filter(filter));
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    // A `log` logger installed by an embedding process keeps its records.
    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::warn!(error = %e, "log records will not be bridged into tracing");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_from_level() {
        std::env::remove_var("RUST_LOG");
        let filter = build_env_filter("certdesk=debug").unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("certdesk=debug"));
        assert!(rendered.contains("hyper=warn"));
    }

    #[test]
    #[serial]
    fn test_invalid_level_rejected() {
        std::env::remove_var("RUST_LOG");
        assert!(matches!(
            build_env_filter("certdesk=notalevel"),
            Err(ConfigError::Logging(_))
        ));
    }

    #[test]
    #[serial]
    fn test_init_tracing_installs_once() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig::default();

        init_tracing(&config).unwrap();
        log::info!("bridged through tracing");

        assert!(matches!(init_tracing(&config), Err(ConfigError::Logging(_))));
    }
}
