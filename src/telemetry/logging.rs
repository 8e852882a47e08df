//! Logging configuration and initialization
//!
//! Structured logging with tracing: a compact or JSON console layer plus an
//! optional non-blocking file layer. Records emitted through the `log` facade
//! (GPU and shader modules) are bridged into the same subscriber.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*, registry::Registry, Layer};

pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;

/// Environment variable holding the filter directives
pub const LOG_ENV: &str = "RELAY_LOG";
/// Environment variable selecting the output format (`json` or anything else)
pub const LOG_FORMAT_ENV: &str = "RELAY_LOG_FORMAT";

const DEFAULT_LOG_FILE: &str = "relay-player.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable console output (default: true)
    pub console_enabled: bool,
    /// Enable file logging (default: false)
    pub file_enabled: bool,
    /// Log file (default: `relay-player.log` in the working directory)
    pub file_path: Option<PathBuf>,
    /// Use JSON format for console logs (default: false)
    pub json_format: bool,
    /// Filter used when neither `RELAY_LOG` nor `RUST_LOG` is set
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_enabled: false,
            file_path: None,
            json_format: false,
            default_level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Resolved log file path
    pub fn log_file(&self) -> &Path {
        self.file_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_LOG_FILE))
    }

    /// Whether JSON output is used, given the value of `RELAY_LOG_FORMAT`
    fn use_json(&self, format_env: Option<&str>) -> bool {
        match format_env {
            Some(value) => value.eq_ignore_ascii_case("json"),
            None => self.json_format,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to install subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Initialize the logging system with the given configuration
///
/// Returns a guard that must be kept alive for the duration of the program
/// so buffered file output is flushed.
///
/// # Environment Variables
///
/// - `RELAY_LOG`: log filter (e.g. "debug", "info,relay_player::video=debug")
/// - `RELAY_LOG_FORMAT`: set to "json" for JSON console output
///
/// # Example
///
/// ```no_run
/// use relay_player::telemetry::{init_logging, LogConfig};
///
/// let config = LogConfig::default();
/// let _guard = init_logging(&config).expect("Failed to initialize logging");
/// // Keep _guard alive for the program duration
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Option<LogGuard>, LoggingError> {
    // RELAY_LOG first, then RUST_LOG, then the configured default
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let format_env = std::env::var(LOG_FORMAT_ENV).ok();
    let use_json = config.use_json(format_env.as_deref());

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut file_guard = None;

    if config.file_enabled {
        let path = config.log_file();
        let file = std::fs::File::create(path).map_err(|source| LoggingError::File {
            path: path.to_path_buf(),
            source,
        })?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        file_guard = Some(guard);

        layers.push(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .boxed(),
        );
    }

    if config.console_enabled {
        let console = if use_json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .boxed()
        };
        layers.push(console);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;

    if config.file_enabled {
        eprintln!("Logging to file: {}", config.log_file().display());
    }

    tracing::info!(
        target: "relay_player",
        version = env!("CARGO_PKG_VERSION"),
        json_format = use_json,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );

    Ok(file_guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert!(config.console_enabled);
        assert!(!config.file_enabled);
        assert!(!config.json_format);
        assert_eq!(config.default_level, "info");
        assert_eq!(config.log_file(), Path::new("relay-player.log"));
    }

    #[test]
    fn test_format_env_overrides_config() {
        let config = LogConfig::default();
        assert!(!config.use_json(None));
        assert!(config.use_json(Some("JSON")));

        let json = LogConfig {
            json_format: true,
            ..Default::default()
        };
        assert!(json.use_json(None));
        assert!(!json.use_json(Some("compact")));
    }

    #[test]
    fn test_unwritable_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            console_enabled: false,
            file_enabled: true,
            file_path: Some(dir.path().join("missing").join("relay.log")),
            ..Default::default()
        };
        assert!(matches!(init_logging(&config), Err(LoggingError::File { .. })));
    }
}
