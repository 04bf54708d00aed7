//! Logging setup.

use plunger_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Filter from `RUST_LOG`, falling back to the configured level.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    let filter = env_filter(&settings.level);
    let layer = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(filter)
            .boxed(),
    };
    tracing_subscriber::registry().with(layer).try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_used_when_rust_log_unset() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = env_filter("debug");
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn directive_lists_are_accepted() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = env_filter("info,plunger_relay=trace");
        assert!(filter.to_string().contains("plunger_relay=trace"));
    }
}
