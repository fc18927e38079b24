//! Tracing subscriber setup

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `LOG_LEVEL`.
pub fn init_tracing(config: &LoggingConfig) {
    let level = config.level.to_lowercase();
    let default_directive = format!("settlement_backend={},tower_http=info", level);
    let filter_directive = std::env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(&filter_directive).unwrap_or_else(|_| EnvFilter::new("info"));

    // try_init: tests and repeated startups may already have a subscriber
    match config.format {
        LogFormat::Json => {
            let _ = fmt()
                .with_env_filter(filter)
                .json()
                .with_current_span(true)
                .try_init();
        }
        LogFormat::Plain => {
            let _ = fmt().with_env_filter(filter).with_target(true).try_init();
        }
    }
}
