//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `start` (default) -- start the gateway server
//! - `config show|path|check` -- inspect configuration
//! - `sign` -- compute request signature headers for a body
//! - `status` -- query a running instance for health info
//! - `version` -- print build/version info

use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::auth::compute_signature;
use crate::config;
use crate::config::schema::{has_errors, validate_schema, SchemaIssue, Severity};
use crate::config::settings::DEFAULT_PORT;
use crate::logging::redact::{redact_credentials, redact_json_value};
use crate::server::http::{SIGNATURE_HEADERS, TIMESTAMP_HEADERS};

/// Authenticated slash command gateway.
#[derive(Parser, Debug)]
#[command(
    name = "slashgate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Slashgate: an authenticated endpoint for chat slash commands"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Start,

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print the signature headers a chat service would send for a body.
    Sign {
        /// Shared secret of the service.
        #[arg(long, env = "SLASHGATE_SIGNING_SECRET")]
        secret: String,

        /// Unix timestamp to sign with (default: now).
        #[arg(long)]
        timestamp: Option<i64>,

        /// Raw form-encoded request body.
        #[arg(long)]
        body: String,
    },

    /// Query a running instance for health/status information.
    Status {
        /// Port of the running instance (default: from config or 18790).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host of the running instance.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Print version information.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the resolved configuration with credentials masked.
    Show,
    /// Print the configuration file path.
    Path,
    /// Validate the configuration file and report problems.
    Check,
}

/// Run the `config show` subcommand.
pub fn handle_config_show() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::load_config()?;
    let pretty = serde_json::to_string_pretty(&masked_config(cfg))?;
    println!("{}", pretty);
    Ok(())
}

/// Run the `config path` subcommand.
pub fn handle_config_path() {
    println!("{}", config::get_config_path().display());
}

/// Run the `config check` subcommand. Exits non-zero when errors are found.
pub fn handle_config_check() -> Result<(), Box<dyn std::error::Error>> {
    let path = config::get_config_path();
    let cfg = config::load_config_uncached(&path)?;
    let issues = validate_schema(&cfg);

    println!("{}", path.display());
    if issues.is_empty() {
        println!("  ok");
        return Ok(());
    }
    for issue in &issues {
        println!("  {}", format_issue(issue));
    }
    if has_errors(&issues) {
        std::process::exit(1);
    }
    Ok(())
}

/// Run the `sign` subcommand.
pub fn handle_sign(
    secret: &str,
    timestamp: Option<i64>,
    body: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let timestamp = timestamp
        .unwrap_or_else(|| chrono::Utc::now().timestamp())
        .to_string();
    let signature = compute_signature(secret, &timestamp, body.as_bytes())
        .ok_or("secret cannot be used as an HMAC key")?;
    println!("{}: {}", TIMESTAMP_HEADERS[0], timestamp);
    println!("{}: {}", SIGNATURE_HEADERS[0], signature);
    Ok(())
}

/// Run the `status` subcommand -- connect to a running instance's health endpoint.
pub async fn handle_status(
    host: &str,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let port = resolve_port(port);
    let url = format!("http://{}:{}/health", host, port);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    let response = match client.get(&url).send().await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Could not connect to slashgate at {}:{}", host, port);
            eprintln!("  Error: {}", e);
            eprintln!();
            eprintln!("Is the server running? Start it with: slashgate start");
            std::process::exit(1);
        }
    };

    if !response.status().is_success() {
        eprintln!(
            "Health endpoint returned HTTP {}: {}",
            response.status(),
            response.text().await.unwrap_or_default()
        );
        std::process::exit(1);
    }

    let body: Value = response.json().await?;

    println!("Slashgate status");
    println!("================");
    if let Some(version) = body.get("version").and_then(|v| v.as_str()) {
        println!("  Version:  {}", version);
    }
    if let Some(uptime) = body.get("uptimeSeconds").and_then(|v| v.as_i64()) {
        println!("  Uptime:   {}", format_duration(uptime));
    }
    println!("  Address:  {}:{}", host, port);
    if let Some(status) = body.get("status").and_then(|v| v.as_str()) {
        println!("  Status:   {}", status);
    }
    Ok(())
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("slashgate {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

/// Mask credentials in a raw config value for display.
fn masked_config(mut cfg: Value) -> Value {
    if let Some(commands) = cfg.get_mut("commands") {
        redact_credentials(commands);
    }
    redact_json_value(&mut cfg);
    cfg
}

fn format_issue(issue: &SchemaIssue) -> String {
    let label = match issue.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    };
    format!("{} at {}: {}", label, issue.path, issue.message)
}

/// Resolve the port to use for connecting to a running instance.
/// Tries (in order): explicit flag, config file value, DEFAULT_PORT.
fn resolve_port(explicit: Option<u16>) -> u16 {
    if let Some(p) = explicit {
        return p;
    }
    if let Ok(cfg) = config::load_config() {
        if let Some(port) = cfg
            .get("server")
            .and_then(|g| g.get("port"))
            .and_then(|v| v.as_u64())
            .and_then(|p| u16::try_from(p).ok())
        {
            return port;
        }
    }
    DEFAULT_PORT
}

/// Format seconds into a human-readable duration string.
fn format_duration(seconds: i64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, mins, secs)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
