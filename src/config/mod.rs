//! Configuration parsing module
//!
//! Handles JSON5 configuration with environment variable substitution and a
//! short-lived cache so every request can take a fresh snapshot cheaply.

pub mod schema;
pub mod settings;

use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

pub use settings::{CommandsConfig, LoggingSection, ServerSection, SlashgateConfig};

/// Default config cache TTL in milliseconds
const DEFAULT_CACHE_TTL_MS: u64 = 200;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse JSON5 at {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("Failed to read config file {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Missing environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Validation error at {path}: {message}")]
    ValidationError { path: String, message: String },
}

/// Cached configuration entry
struct CachedConfig {
    path: PathBuf,
    value: Value,
    loaded_at: Instant,
}

/// Global config cache
static CONFIG_CACHE: LazyLock<RwLock<Option<CachedConfig>>> = LazyLock::new(|| RwLock::new(None));

/// Get the config file path.
/// Priority: SLASHGATE_CONFIG_PATH > SLASHGATE_STATE_DIR/slashgate.json5 > ~/.slashgate/slashgate.json5
/// Falls back to .json extension if the .json5 file doesn't exist.
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = env::var("SLASHGATE_CONFIG_PATH") {
        return PathBuf::from(path);
    }

    if let Ok(state_dir) = env::var("SLASHGATE_STATE_DIR") {
        return pick_config_file(PathBuf::from(state_dir));
    }

    let base = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".slashgate");
    pick_config_file(base)
}

fn pick_config_file(dir: PathBuf) -> PathBuf {
    let json5 = dir.join("slashgate.json5");
    if json5.exists() {
        return json5;
    }
    dir.join("slashgate.json")
}

/// Get the cache TTL duration
fn get_cache_ttl() -> Option<Duration> {
    if env::var("SLASHGATE_DISABLE_CONFIG_CACHE").is_ok() {
        return None;
    }

    let ms = env::var("SLASHGATE_CONFIG_CACHE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_CACHE_TTL_MS);

    Some(Duration::from_millis(ms))
}

/// Load and parse the configuration file at the default path.
/// Returns an empty object `{}` if the file doesn't exist.
pub fn load_config() -> Result<Value, ConfigError> {
    load_config_cached(&get_config_path())
}

/// Load `path` through the cache.
pub fn load_config_cached(path: &Path) -> Result<Value, ConfigError> {
    if let Some(ttl) = get_cache_ttl() {
        let cache = CONFIG_CACHE.read();
        if let Some(cached) = cache.as_ref() {
            if cached.path == path && cached.loaded_at.elapsed() < ttl {
                return Ok(cached.value.clone());
            }
        }
    }

    let config = load_config_uncached(path)?;

    if get_cache_ttl().is_some() {
        let mut cache = CONFIG_CACHE.write();
        *cache = Some(CachedConfig {
            path: path.to_path_buf(),
            value: config.clone(),
            loaded_at: Instant::now(),
        });
    }

    Ok(config)
}

/// Load config without using the cache.
pub fn load_config_uncached(path: &Path) -> Result<Value, ConfigError> {
    if !path.exists() {
        debug!(target: "config", path = %path.display(), "config file not found, using defaults");
        return Ok(Value::Object(serde_json::Map::new()));
    }

    let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut value = parse_json5(&content, path)?;
    substitute_env_vars(&mut value)?;
    Ok(value)
}

/// Parse JSON5 content
fn parse_json5(content: &str, path: &Path) -> Result<Value, ConfigError> {
    json5::from_str(content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Substitute environment variables in string values.
/// Pattern: ${VAR} where VAR matches [A-Z_][A-Z0-9_]*
/// Escape with $${VAR} to get literal ${VAR}
fn substitute_env_vars(value: &mut Value) -> Result<(), ConfigError> {
    match value {
        Value::String(s) => {
            *s = substitute_env_in_string(s)?;
        }
        Value::Object(obj) => {
            for (_, v) in obj.iter_mut() {
                substitute_env_vars(v)?;
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                substitute_env_vars(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

static ENV_VAR_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$\$?\{([A-Z_][A-Z0-9_]*)\}").ok());

/// Substitute environment variables in a single string
fn substitute_env_in_string(s: &str) -> Result<String, ConfigError> {
    let Some(pattern) = ENV_VAR_PATTERN.as_ref() else {
        return Ok(s.to_string());
    };

    let mut result = String::with_capacity(s.len());
    let mut last_end = 0;

    for caps in pattern.captures_iter(s) {
        let (Some(full_match), Some(var)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let var_name = var.as_str();

        result.push_str(&s[last_end..full_match.start()]);

        if full_match.as_str().starts_with("$$") {
            result.push_str(&format!("${{{}}}", var_name));
        } else {
            let value = env::var(var_name).map_err(|_| ConfigError::MissingEnvVar {
                var: var_name.to_string(),
            })?;
            result.push_str(&value);
        }

        last_end = full_match.end();
    }

    result.push_str(&s[last_end..]);

    Ok(result)
}

/// Clear the config cache (useful for testing or forced reload)
pub fn clear_cache() {
    let mut cache = CONFIG_CACHE.write();
    *cache = None;
}

/// Where request handlers get their configuration from.
///
/// Each request takes one snapshot and uses it throughout.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A config fixed at startup (tests, embedding).
    Fixed(Arc<SlashgateConfig>),
    /// Re-read from disk through the TTL cache.
    File(PathBuf),
}

impl ConfigSource {
    pub fn fixed(config: SlashgateConfig) -> Self {
        ConfigSource::Fixed(Arc::new(config))
    }

    /// Current configuration.
    pub fn snapshot(&self) -> Result<Arc<SlashgateConfig>, ConfigError> {
        match self {
            ConfigSource::Fixed(config) => Ok(config.clone()),
            ConfigSource::File(path) => {
                let value = load_config_cached(path)?;
                SlashgateConfig::from_value(&value).map(Arc::new)
            }
        }
    }
}
