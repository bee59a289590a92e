//! Logging subsystem
//!
//! Structured logging via tracing with support for JSON (production) and
//! plaintext (development) output formats. Every writer is wrapped in a
//! [`redact::RedactingMakeWriter`].
//!
//! # Log Targets
//!
//! - `http` - HTTP server
//! - `auth` - request authentication
//! - `commands` - dispatch and help routing
//! - `delayed` - delayed responses
//! - `config` - configuration loading
//!
//! # Environment Variables
//!
//! - `SLASHGATE_LOG` - Primary log level/filter (takes precedence)
//! - `RUST_LOG` - Fallback log level/filter
//!
//! # Examples
//!
//! ```no_run
//! use slashgate::logging::{init_logging, LogConfig};
//!
//! init_logging(LogConfig::production()).unwrap();
//! ```

pub mod redact;

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use crate::logging::redact::RedactingMakeWriter;
use tracing::Level;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Guard to track if logging has been initialized
static INIT_GUARD: OnceLock<()> = OnceLock::new();

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON format for production (structured logs)
    Json,
    /// Human-readable plaintext for development
    #[default]
    Plaintext,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "plaintext" | "text" | "pretty" => Some(LogFormat::Plaintext),
            _ => None,
        }
    }
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// Write to stdout
    #[default]
    Stdout,
    /// Write to stderr
    Stderr,
    /// Write to a file at the given path
    File(PathBuf),
}

/// Configuration for the logging subsystem
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub output: LogOutput,
    /// Default log level when no env filter is set
    pub default_level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Plaintext,
            output: LogOutput::Stdout,
            default_level: Level::INFO,
        }
    }
}

impl LogConfig {
    /// Plaintext to stdout, debug level
    pub fn development() -> Self {
        Self {
            format: LogFormat::Plaintext,
            output: LogOutput::Stdout,
            default_level: Level::DEBUG,
        }
    }

    /// JSON to stdout, info level
    pub fn production() -> Self {
        Self {
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            default_level: Level::INFO,
        }
    }

    /// Apply the `logging` config section on top of this config.
    pub fn with_section(mut self, section: &crate::config::LoggingSection) -> Self {
        if let Ok(level) = Level::from_str(&section.level) {
            self.default_level = level;
        }
        if let Some(format) = section.format.as_deref().and_then(LogFormat::parse) {
            self.format = format;
        }
        self
    }
}

/// Error type for logging initialization
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to create log file: {0}")]
    FileCreation(#[from] io::Error),
    #[error("failed to parse log filter: {0}")]
    FilterParse(#[from] tracing_subscriber::filter::ParseError),
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("failed to initialize subscriber: {0}")]
    TryInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Build an EnvFilter from environment variables or default level.
///
/// Checks SLASHGATE_LOG first, then RUST_LOG, falling back to the default level.
fn build_env_filter(default_level: Level) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = std::env::var("SLASHGATE_LOG") {
        return Ok(EnvFilter::try_new(filter)?);
    }
    if let Ok(filter) = std::env::var("RUST_LOG") {
        return Ok(EnvFilter::try_new(filter)?);
    }

    let default_filter = format!(
        "{level},http={level},auth={level},commands={level},delayed={level},config={level}",
        level = default_level.as_str().to_lowercase()
    );
    Ok(EnvFilter::try_new(default_filter)?)
}

fn make_writer(output: &LogOutput) -> Result<BoxMakeWriter, LoggingError> {
    Ok(match output {
        LogOutput::Stdout => BoxMakeWriter::new(RedactingMakeWriter::new(io::stdout)),
        LogOutput::Stderr => BoxMakeWriter::new(RedactingMakeWriter::new(io::stderr)),
        LogOutput::File(path) => {
            let file = Arc::new(File::create(path)?);
            BoxMakeWriter::new(RedactingMakeWriter::new(file))
        }
    })
}

/// Initialize the logging subsystem with the given configuration.
///
/// Call once at startup; later calls return [`LoggingError::AlreadyInitialized`].
pub fn init_logging(config: LogConfig) -> Result<(), LoggingError> {
    if INIT_GUARD.set(()).is_err() {
        return Err(LoggingError::AlreadyInitialized);
    }
    install(config)
}

fn install(config: LogConfig) -> Result<(), LoggingError> {
    let filter = build_env_filter(config.default_level)?;
    let writer = make_writer(&config.output)?;
    let timer = UtcTime::rfc_3339();

    let layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_timer(timer)
            .with_target(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        LogFormat::Plaintext => tracing_subscriber::fmt::layer()
            .with_timer(timer)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(layer).try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    /// Mutex to serialize tests that modify global state (env vars).
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_log_config_presets() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Plaintext);
        assert_eq!(config.default_level, Level::INFO);

        let config = LogConfig::development();
        assert_eq!(config.default_level, Level::DEBUG);

        let config = LogConfig::production();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Stdout);
    }

    #[test]
    fn test_log_config_from_section() {
        let section = crate::config::LoggingSection {
            level: "warn".to_string(),
            format: Some("json".to_string()),
        };
        let config = LogConfig::development().with_section(&section);
        assert_eq!(config.default_level, Level::WARN);
        assert_eq!(config.format, LogFormat::Json);

        let section = crate::config::LoggingSection {
            level: "loud".to_string(),
            format: Some("xml".to_string()),
        };
        let config = LogConfig::development().with_section(&section);
        assert_eq!(config.default_level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Plaintext);
    }

    #[test]
    fn test_env_filter_default() {
        let _lock = TEST_LOCK.lock().unwrap();
        std::env::remove_var("SLASHGATE_LOG");
        std::env::remove_var("RUST_LOG");
        assert!(build_env_filter(Level::INFO).is_ok());
    }

    #[test]
    fn test_env_filter_slashgate_log() {
        let _lock = TEST_LOCK.lock().unwrap();
        std::env::set_var("SLASHGATE_LOG", "auth=debug,commands=trace");
        assert!(build_env_filter(Level::INFO).is_ok());
        std::env::remove_var("SLASHGATE_LOG");
    }

    #[test]
    fn test_env_filter_invalid() {
        let _lock = TEST_LOCK.lock().unwrap();
        std::env::set_var("SLASHGATE_LOG", "auth=notalevel=");
        assert!(matches!(
            build_env_filter(Level::INFO),
            Err(LoggingError::FilterParse(_))
        ));
        std::env::remove_var("SLASHGATE_LOG");
    }

    #[test]
    fn test_file_writer_created() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();
        assert!(make_writer(&LogOutput::File(path.clone())).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_logging_error_display() {
        assert_eq!(
            LoggingError::AlreadyInitialized.to_string(),
            "logging already initialized"
        );
    }
}
