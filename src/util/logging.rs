//! Structured logging setup
//!
//! Logs go to stderr so that command output on stdout stays machine-readable
//! (`--format json` can be piped straight into `jq`).
//!
//! ```no_run
//! use shipwright::util::logging;
//!
//! logging::init_from_env();
//! tracing::info!(tool = "trivy", "Starting scan");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Crates whose debug output drowns ours; capped at `warn` unless `RUST_LOG` is set.
const NOISY_CRATES: &[&str] = &["h2", "hyper", "hyper_util", "reqwest", "bollard"];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for shipwright's own targets
    pub level: Level,
    /// Emit one JSON object per event instead of human-readable lines
    pub use_json: bool,
    pub include_target: bool,
    /// Include file and line number
    pub include_location: bool,
    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: false,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    /// Picks a preset for `level`: `production` when JSON is requested,
    /// `development` at DEBUG or finer, plain defaults otherwise.
    pub fn for_level(level: Level, use_json: bool) -> Self {
        let preset = if use_json {
            Self::production()
        } else if level >= Level::DEBUG {
            Self::development()
        } else {
            Self::default()
        };
        Self { level, ..preset }
    }

    /// JSON output with full metadata, for log shippers
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }

    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            include_target: true,
            ..Default::default()
        }
    }
}

/// Parses a level name case-insensitively, falling back to INFO.
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn build_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();

    if let Ok(directive) = format!("shipwright={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    if env::var("RUST_LOG").is_err() {
        for krate in NOISY_CRATES {
            if let Ok(directive) = format!("{}=warn", krate).parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    filter
}

/// Installs the global subscriber. Only the first call has any effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);

        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.include_target)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_thread_names(config.include_thread_ids);

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .init();
        } else {
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    });
}

/// Reads `SHIPWRIGHT_LOG_LEVEL` and `SHIPWRIGHT_LOG_JSON`; `RUST_LOG`
/// directives still apply on top.
pub fn init_from_env() {
    let level_str = env::var("SHIPWRIGHT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    init_logging(LoggingConfig::for_level(parse_level(&level_str), json_from_env()));
}

/// `SHIPWRIGHT_LOG_JSON=true` switches to JSON lines.
pub fn json_from_env() -> bool {
    env::var("SHIPWRIGHT_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_case_insensitive() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("Debug"), Level::DEBUG);
    }

    #[test]
    fn test_parse_level_invalid() {
        assert_eq!(parse_level("invalid"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_presets() {
        let production = LoggingConfig::production();
        assert!(production.use_json);
        assert!(production.include_location);

        let development = LoggingConfig::development();
        assert_eq!(development.level, Level::DEBUG);
        assert!(!development.use_json);
        assert!(development.include_target);
    }

    #[test]
    fn test_for_level_selects_preset() {
        let json = LoggingConfig::for_level(Level::WARN, true);
        assert!(json.use_json);
        assert!(json.include_location);
        assert_eq!(json.level, Level::WARN);

        let verbose = LoggingConfig::for_level(Level::TRACE, false);
        assert!(verbose.include_target);
        assert_eq!(verbose.level, Level::TRACE);

        let quiet = LoggingConfig::for_level(Level::ERROR, false);
        assert!(!quiet.use_json);
        assert!(!quiet.include_target);
    }

    #[test]
    fn test_build_filter_contains_crate_directive() {
        let filter = build_filter(Level::DEBUG);
        assert!(filter.to_string().contains("shipwright=debug"));
    }
}
