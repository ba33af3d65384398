//! Structured logging setup using tracing
//!
//! ## Environment Variables
//!
//! - `LOG_LEVEL`: ERROR, WARN, INFO, DEBUG or TRACE (default INFO)
//! - `LOG_FORMAT`: json, pretty or compact (default json)
//! - `LOG_SPANS`: emit span open/close events when `true` (default false)
//! - `RUST_LOG`: full filter override
//!
//! ```bash
//! LOG_FORMAT=pretty LOG_LEVEL=DEBUG brokerlink run --config link.toml
//! ```

use std::env;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Dependency targets that are only interesting when something is wrong
const QUIET_TARGETS: &[&str] = &["rumqttc=warn", "tokio=warn", "rustls=warn"];

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Machine-readable JSON lines
    Json,
    /// Multi-line, coloured
    Pretty,
    /// Single-line, coloured, no target
    Compact,
}

impl LogFormat {
    /// Unknown values fall back to JSON
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Unknown values fall back to INFO
pub fn parse_level(s: &str) -> Level {
    match s.to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Filter for `level` with dependency noise reduced, unless `RUST_LOG` is set
pub fn build_filter(level: Level) -> EnvFilter {
    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }

    QUIET_TARGETS
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(EnvFilter::new(level.to_string()), |filter, directive| {
            filter.add_directive(directive)
        })
}

fn span_events(include_spans: bool) -> FmtSpan {
    if include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Install the global subscriber
///
/// A second call keeps the first subscriber and returns `false`.
pub fn init_logging(level: Level, format: LogFormat, include_spans: bool) -> bool {
    let subscriber = tracing_subscriber::registry().with(build_filter(level));
    let spans = span_events(include_spans);

    let installed = match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_span_events(spans))
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(fmt::layer().pretty().with_ansi(true).with_span_events(spans))
            .try_init(),
        LogFormat::Compact => subscriber
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(true)
                    .with_target(false)
                    .with_span_events(spans),
            )
            .try_init(),
    };

    installed.is_ok()
}

/// Install the global subscriber from `LOG_LEVEL`, `LOG_FORMAT` and `LOG_SPANS`
pub fn init_default_logging() -> bool {
    let level = parse_level(&env::var("LOG_LEVEL").unwrap_or_default());
    let format = LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_default());
    let include_spans = env::var("LOG_SPANS")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    init_logging(level, format, include_spans)
}

/// Span covering a session lifecycle step
#[macro_export]
macro_rules! session_span {
    ($($field:tt)*) => {
        tracing::info_span!("link_session", $($field)*)
    };
}

pub use session_span;
