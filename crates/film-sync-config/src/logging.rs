//! Logging initialization.
//!
//! Processes are log producers only: they call [`init_logging`] once at
//! startup and use plain `tracing` macros everywhere else.

use crate::LogFormat;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `level` when set. Calling this twice is harmless;
/// the second installation is skipped.
///
/// ```ignore
/// init_logging("legacydb-synchronizer", "info", LogFormat::Compact);
/// tracing::info!("consumer started");
/// ```
pub fn init_logging(service_name: &str, level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let installed = match format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .finish()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .finish()
            .try_init(),
    };

    if installed.is_ok() {
        tracing::info!(service = service_name, level, "Logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        init_logging("test", "debug", LogFormat::Compact);
        init_logging("test", "debug", LogFormat::Json);
    }
}
