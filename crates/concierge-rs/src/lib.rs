//! Public SDK surface for Concierge.
//!
//! This crate re-exports the runtime building blocks and provides the
//! logging setup shared by the `concierge` binary and embedding services.

/// Re-export for convenience.
pub use concierge_rs_config as config;
pub use concierge_rs_core as core;
/// Re-export for convenience.
pub use concierge_rs_memory as memory;
/// Re-export for convenience.
pub use concierge_rs_protocol as protocol;
pub use concierge_rs_tools as tools;

use concierge_rs_config::{LogFormat, LoggingConfig};
use log::{LevelFilter, Record};
use std::io::Write;

/// Initialize `env_logger` from the logging config.
///
/// `RUST_LOG` overrides the configured level. HTTP client internals are
/// capped at `warn`. Calling this twice is harmless.
pub fn init_logging(config: &LoggingConfig) {
    let mut builder = env_logger::Builder::new();
    builder
        .parse_filters(&config.level)
        .filter_module("hyper", LevelFilter::Warn)
        .filter_module("reqwest", LevelFilter::Warn)
        .parse_default_env();
    match config.format {
        LogFormat::Console => {
            builder.format_timestamp_millis();
        }
        LogFormat::Json => {
            builder.format(|buf, record| writeln!(buf, "{}", json_line(record)));
        }
    }
    let _ = builder.try_init();
}

/// One log record as a single-line JSON object.
fn json_line(record: &Record<'_>) -> String {
    serde_json::json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "level": record.level().as_str(),
        "target": record.target(),
        "message": record.args().to_string(),
    })
    .to_string()
}
