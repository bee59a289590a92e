//! Slash commands
//!
//! A request that passed authentication becomes a [`Command`]. The
//! [`CommandRegistry`] runs it through the dispatch chain (name-specific
//! handlers, then generic ones if nothing recognised it) and, when the command
//! stays unknown or the text asks for help, through the help chain. The
//! outcome is rendered by [`dispatch::build_outcome`].

pub mod command;
pub mod delayed;
pub mod dispatch;
pub mod help;
pub mod pipeline;
pub mod registry;
pub mod reply;

pub use command::{Command, CommandError};
pub use delayed::{DelayedDelivery, DelayedResponder, DelayedResponseError};
pub use dispatch::{build_outcome, route, ResponseState};
pub use help::{HelpMatcher, HelpTopics, DEFAULT_HELP_WORD};
pub use pipeline::{handle_inbound, parse_form_fields, InboundRequest, RequestError};
pub use registry::{CommandHandler, CommandRegistry, HelpHandler};
pub use reply::{Outcome, Reply};
