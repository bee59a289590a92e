//! slashgate library
//!
//! Authenticated endpoint for chat-service slash commands: token and
//! HMAC signature checks, a two-tier command and help registry, the
//! response state machine, and delayed replies via `response_url`.

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod server;
