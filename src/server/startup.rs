//! Testable server startup logic.
//!
//! Provides [`ServerConfig`] and [`ServerHandle`] so integration tests can
//! spin up a real server on an ephemeral port, exercise its endpoints, and
//! shut it down cleanly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::commands::CommandRegistry;
use crate::config::{ConfigError, ConfigSource, SlashgateConfig};
use crate::server::bind::{parse_bind_mode, resolve_bind_address, BindError};
use crate::server::http::{create_router, HttpConfig};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("bind address error: {0}")]
    Bind(#[from] BindError),

    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Everything needed to start a server.
pub struct ServerConfig {
    pub http_config: HttpConfig,
    pub config: ConfigSource,
    pub registry: Arc<CommandRegistry>,
    pub bind_address: SocketAddr,
}

impl ServerConfig {
    /// Resolve listen address and routes from a loaded config.
    ///
    /// Requests re-read `config` through the cache, so credential edits apply
    /// without a restart. The namespace and body limit are fixed here.
    pub fn from_config(
        loaded: &SlashgateConfig,
        config: ConfigSource,
        registry: Arc<CommandRegistry>,
    ) -> Result<Self, StartupError> {
        let mode = parse_bind_mode(&loaded.server.bind);
        let bind_address = resolve_bind_address(&mode, loaded.server.port)?;
        Ok(ServerConfig {
            http_config: HttpConfig::from_config(loaded),
            config,
            registry,
            bind_address,
        })
    }

    /// Binds to `127.0.0.1:0` (OS-assigned port) with a fixed config.
    pub fn for_testing(config: SlashgateConfig, registry: Arc<CommandRegistry>) -> Self {
        ServerConfig {
            http_config: HttpConfig::from_config(&config),
            config: ConfigSource::fixed(config),
            registry,
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        }
    }
}

/// Handle to a running server.  Returned by [`run_server_with_config`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    server_task: JoinHandle<Result<(), std::io::Error>>,
}

impl ServerHandle {
    /// The port the server actually bound to (useful when binding to port 0).
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `http://ip:port` base URL for the running server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        match tokio::time::timeout(Duration::from_secs(5), self.server_task).await {
            Ok(Ok(Ok(()))) => info!(target: "http", "server stopped"),
            Ok(Ok(Err(e))) => error!(target: "http", "Server task returned error: {}", e),
            Ok(Err(e)) => error!(target: "http", "Server task panicked: {}", e),
            Err(_) => warn!(target: "http", "Server task did not finish within 5s timeout"),
        }
    }
}

/// Start a server from a fully-assembled [`ServerConfig`].
pub async fn run_server_with_config(config: ServerConfig) -> Result<ServerHandle, StartupError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let namespace = config.http_config.namespace.clone();
    let app = create_router(config.http_config, config.config, config.registry);

    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .map_err(|source| StartupError::Listen {
            addr: config.bind_address,
            source,
        })?;
    let local_addr = listener.local_addr().map_err(|source| StartupError::Listen {
        addr: config.bind_address,
        source,
    })?;
    info!(target: "http", %local_addr, %namespace, "listening");

    let mut shutdown_watch = shutdown_rx;
    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                loop {
                    if *shutdown_watch.borrow() {
                        break;
                    }
                    if shutdown_watch.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
    });

    Ok(ServerHandle {
        local_addr,
        shutdown_tx,
        server_task,
    })
}
