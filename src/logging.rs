//! Tracing subscriber setup.
//!
//! `RUST_LOG` picks the filter (default `warn,compliance_bridge=info`) and
//! `LOG_FORMAT=json` switches to one JSON object per line. Logs go to stderr
//! so command output on stdout stays clean.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "warn,compliance_bridge=info";

pub fn init_logger() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let filter = EnvFilter::try_new(&log_level)?;

    match log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .try_init()?,
        _ => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .try_init()?,
    }

    Ok(())
}
