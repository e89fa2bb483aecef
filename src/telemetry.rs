//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! - LOG_LEVEL is an EnvFilter directive string; unset falls back to `DEFAULT_FILTER`.
//! - LOG_FORMAT picks `pretty` (default) or `json` output.
//!
//! Targets stay in the output: `evaluation`, `ranking`, `usage_log`, `forum`,
//! `store`, `scheduler` and `thinkscore` are how operators tell the subsystems apart.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,evaluation=debug,thinkscore=debug,tower_http=info,axum=info";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // The two builders have different types, so each arm finishes its own init.
    match LogFormat::parse(std::env::var("LOG_FORMAT").ok().as_deref()) {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
