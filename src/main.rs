use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tracing::{error, info, warn};

use slashgate::cli::{self, Cli, Command, ConfigCommand};
use slashgate::commands::CommandRegistry;
use slashgate::config::{self, ConfigSource, SlashgateConfig};
use slashgate::logging;
use slashgate::server::{run_server_with_config, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        // No subcommand or explicit `start` both launch the server.
        None | Some(Command::Start) => run_server().await,

        Some(Command::Config(sub)) => {
            match sub {
                ConfigCommand::Show => cli::handle_config_show()?,
                ConfigCommand::Path => cli::handle_config_path(),
                ConfigCommand::Check => cli::handle_config_check()?,
            }
            Ok(())
        }

        Some(Command::Sign {
            secret,
            timestamp,
            body,
        }) => cli::handle_sign(&secret, timestamp, &body),

        Some(Command::Status { port, host }) => cli::handle_status(&host, port).await,

        Some(Command::Version) => {
            cli::handle_version();
            Ok(())
        }
    }
}

async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    let raw = load_raw_config();
    let issues = config::schema::validate_schema(&raw);
    // Only a schema-clean value is deserialized; otherwise log with defaults.
    let loaded = if config::schema::has_errors(&issues) {
        SlashgateConfig::default()
    } else {
        SlashgateConfig::from_value(&raw)?
    };
    init_logging_from_env(&loaded)?;
    report_schema_issues(&issues)?;

    let registry = Arc::new(CommandRegistry::new());
    if loaded.commands.is_none() {
        warn!("No `commands` section configured; the command endpoint answers 404");
    } else if registry.is_empty() {
        info!("No command handlers registered; every command gets the unknown-command reply");
    }

    let server_config = ServerConfig::from_config(
        &loaded,
        ConfigSource::File(config::get_config_path()),
        registry,
    )?;
    info!(
        "slashgate v{} starting on {}",
        env!("CARGO_PKG_VERSION"),
        server_config.bind_address
    );

    let handle = run_server_with_config(server_config).await?;

    let reason = await_shutdown_trigger().await;
    info!("Shutdown signal received ({})", reason);
    handle.shutdown().await;

    info!("slashgate shut down");
    Ok(())
}

/// Logging is not up yet when the config is read, so failures go to stderr.
fn load_raw_config() -> Value {
    config::load_config().unwrap_or_else(|e| {
        eprintln!("Failed to load config: {}, using defaults", e);
        Value::Object(serde_json::Map::new())
    })
}

/// Initialize logging from SLASHGATE_DEV and the `logging` config section.
fn init_logging_from_env(loaded: &SlashgateConfig) -> Result<(), Box<dyn std::error::Error>> {
    let base = if std::env::var("SLASHGATE_DEV")
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
    {
        logging::LogConfig::development()
    } else {
        logging::LogConfig::production()
    };
    logging::init_logging(base.with_section(&loaded.logging))?;
    Ok(())
}

/// Report schema issues; errors abort startup.
fn report_schema_issues(
    issues: &[config::schema::SchemaIssue],
) -> Result<(), Box<dyn std::error::Error>> {
    for issue in issues {
        match issue.severity {
            config::schema::Severity::Error => {
                error!("Config error at {}: {}", issue.path, issue.message);
            }
            config::schema::Severity::Warning => {
                warn!("Config warning at {}: {}", issue.path, issue.message);
            }
        }
    }
    if config::schema::has_errors(issues) {
        return Err("Configuration contains errors, aborting startup".into());
    }
    Ok(())
}

/// Wait for either Ctrl+C or SIGTERM (Unix only) and return a label for logging.
#[cfg(unix)]
async fn await_shutdown_trigger() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "ctrl-c",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            warn!(
                "Failed to install SIGTERM handler: {}; falling back to Ctrl+C only",
                e
            );
            match tokio::signal::ctrl_c().await {
                Ok(()) => "ctrl-c",
                Err(e) => {
                    error!("Failed to install Ctrl+C handler: {}", e);
                    std::future::pending::<&'static str>().await
                }
            }
        }
    }
}

/// On non-Unix platforms, only Ctrl+C is available.
#[cfg(not(unix))]
async fn await_shutdown_trigger() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "ctrl-c",
        Err(e) => {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<&'static str>().await
        }
    }
}
