//! Logging setup.

use crate::config::LoggingSettings;
use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Level actually used: `--debug` wins over the configured level.
pub fn effective_level(config: &LoggingSettings, debug: bool) -> &str {
    if debug {
        "debug"
    } else {
        config.level.as_str()
    }
}

/// Initializes the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn setup_logging(config: &LoggingSettings, debug: bool) -> Result<()> {
    let log_level = effective_level(config, debug);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_target(false),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flag_overrides_level() {
        let settings = LoggingSettings {
            level: "warn".to_string(),
            json_format: false,
        };
        assert_eq!(effective_level(&settings, false), "warn");
        assert_eq!(effective_level(&settings, true), "debug");
    }
}
