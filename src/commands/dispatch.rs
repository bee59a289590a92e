//! Routing a command to its immediate response.
//!
//! [`route`] drives the registry and settles on a [`ResponseState`];
//! [`build_outcome`] maps that state to the body the caller receives.

use serde_json::Value;
use tracing::debug;

use super::command::Command;
use super::help::{normalize_terms, render_help, HelpMatcher};
use super::registry::CommandRegistry;
use super::reply::{Outcome, Reply};

/// Sent when a command was recognised but the handlers left no reply.
pub const KNOWN_UNHANDLED_MESSAGE: &str =
    "Command was understood but no action was performed for some reason.";

/// Sent when a command was handled without a reply.
pub const HANDLED_MESSAGE: &str = "Command received.";

/// Preamble shown above the help text for unrecognised commands.
pub fn unknown_command_message(help_word: &str) -> String {
    format!("Don't know what to do with that command. Type `{help_word}` for help.")
}

/// Where a command ended up after dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseState {
    /// The text asked for help; dispatch was skipped.
    HelpRequested { terms: String },
    /// No handler recognised the command.
    DispatchedUnknown { terms: String },
    /// Recognised but not marked handled.
    DispatchedKnownUnhandled(Reply),
    /// Handled with an object or array payload.
    DispatchedHandledNonScalar(Value),
    /// Handled with a text or scalar reply.
    DispatchedHandledScalar(Reply),
}

impl ResponseState {
    /// Classify a finished dispatch.
    pub fn after_dispatch(command: &Command, reply: Reply) -> Self {
        if !command.is_known() {
            return ResponseState::DispatchedUnknown {
                terms: normalize_terms(command.text()),
            };
        }
        if !command.is_handled() {
            return ResponseState::DispatchedKnownUnhandled(reply);
        }
        if reply.is_structured() {
            if let Reply::Rich(value) = reply {
                return ResponseState::DispatchedHandledNonScalar(value);
            }
        }
        ResponseState::DispatchedHandledScalar(reply)
    }

    /// States that need the help chain before rendering.
    pub fn help_terms(&self) -> Option<&str> {
        match self {
            ResponseState::HelpRequested { terms } | ResponseState::DispatchedUnknown { terms } => {
                Some(terms)
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseState::HelpRequested { .. } => "help_requested",
            ResponseState::DispatchedUnknown { .. } => "dispatched_unknown",
            ResponseState::DispatchedKnownUnhandled(_) => "dispatched_known_unhandled",
            ResponseState::DispatchedHandledNonScalar(_) => "dispatched_handled_nonscalar",
            ResponseState::DispatchedHandledScalar(_) => "dispatched_handled_scalar",
        }
    }
}

/// Run help detection, dispatch and help collection for `command`.
///
/// `matcher` comes from the config snapshot; its keyword also fills the
/// unknown-command preamble.
pub fn route(
    registry: &CommandRegistry,
    command: &mut Command,
    matcher: &HelpMatcher,
) -> Outcome {
    let state = match matcher.match_terms(command.text()) {
        Some(terms) => ResponseState::HelpRequested { terms },
        None => {
            let reply = registry.dispatch(command);
            ResponseState::after_dispatch(command, reply)
        }
    };

    if let Some(terms) = state.help_terms() {
        registry.collect_help(command, terms);
    }

    debug!(
        target: "commands",
        service_id = %command.service_id(),
        name = %command.name(),
        state = state.name(),
        "command routed"
    );

    build_outcome(&state, command, matcher.word())
}

/// Render the immediate response for a settled state.
pub fn build_outcome(state: &ResponseState, command: &Command, help_word: &str) -> Outcome {
    match state {
        ResponseState::HelpRequested { terms } => {
            Outcome::Text(render_help(None, command.help(), terms))
        }
        ResponseState::DispatchedUnknown { terms } => {
            let preamble = unknown_command_message(help_word);
            Outcome::Text(render_help(Some(&preamble), command.help(), terms))
        }
        ResponseState::DispatchedKnownUnhandled(reply) => {
            Outcome::Text(text_or(reply, KNOWN_UNHANDLED_MESSAGE))
        }
        ResponseState::DispatchedHandledNonScalar(value) => Outcome::Rich(value.clone()),
        ResponseState::DispatchedHandledScalar(reply) => {
            Outcome::Text(text_or(reply, HANDLED_MESSAGE))
        }
    }
}

fn text_or(reply: &Reply, fallback: &str) -> String {
    let text = reply.clone().into_text();
    if text.is_empty() {
        fallback.to_string()
    } else {
        text
    }
}
