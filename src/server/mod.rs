//! Server module
//!
//! HTTP transport for the slash command endpoint.

pub mod bind;
pub mod http;
pub mod startup;

pub use http::{create_router, AppState, HttpConfig};
pub use startup::{run_server_with_config, ServerConfig, ServerHandle, StartupError};
