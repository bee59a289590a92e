//! Command handler registry
//!
//! Two chains, each with handlers keyed by command name plus a list of
//! generic handlers that see every command:
//! - dispatch handlers produce the immediate reply
//! - help handlers contribute help topics
//!
//! Handlers run in registration order. Handler lists are copied out of the
//! lock before any handler runs, so handlers may register further handlers.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::command::Command;
use super::reply::Reply;

/// Dispatch handler: receives the reply so far, returns the reply to keep.
pub type CommandHandler = Arc<dyn Fn(&mut Command, Reply) -> Reply + Send + Sync>;

/// Help handler: receives the normalised help terms.
pub type HelpHandler = Arc<dyn Fn(&mut Command, &str) + Send + Sync>;

struct Chain<H> {
    by_name: HashMap<String, Vec<H>>,
    any: Vec<H>,
}

impl<H: Clone> Chain<H> {
    fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            any: Vec::new(),
        }
    }

    fn specific(&self, name: &str) -> Vec<H> {
        self.by_name.get(name).cloned().unwrap_or_default()
    }

    fn generic(&self) -> Vec<H> {
        self.any.clone()
    }

    fn len(&self) -> usize {
        self.any.len() + self.by_name.values().map(Vec::len).sum::<usize>()
    }
}

/// Registered dispatch and help handlers.
pub struct CommandRegistry {
    commands: RwLock<Chain<CommandHandler>>,
    help: RwLock<Chain<HelpHandler>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: RwLock::new(Chain::new()),
            help: RwLock::new(Chain::new()),
        }
    }

    /// Handle one command name. A leading slash in `name` is ignored.
    pub fn on_command<F>(&self, name: impl AsRef<str>, handler: F)
    where
        F: Fn(&mut Command, Reply) -> Reply + Send + Sync + 'static,
    {
        self.commands
            .write()
            .by_name
            .entry(normalize_name(name.as_ref()))
            .or_default()
            .push(Arc::new(handler));
    }

    /// Handle any command not claimed by a name-specific handler.
    pub fn on_any_command<F>(&self, handler: F)
    where
        F: Fn(&mut Command, Reply) -> Reply + Send + Sync + 'static,
    {
        self.commands.write().any.push(Arc::new(handler));
    }

    /// Provide help for one command name.
    pub fn on_help<F>(&self, name: impl AsRef<str>, handler: F)
    where
        F: Fn(&mut Command, &str) + Send + Sync + 'static,
    {
        self.help
            .write()
            .by_name
            .entry(normalize_name(name.as_ref()))
            .or_default()
            .push(Arc::new(handler));
    }

    /// Provide help for any command lacking specific help.
    pub fn on_any_help<F>(&self, handler: F)
    where
        F: Fn(&mut Command, &str) + Send + Sync + 'static,
    {
        self.help.write().any.push(Arc::new(handler));
    }

    /// Run the dispatch chain and return the final reply.
    ///
    /// Every name-specific handler runs; generic handlers run only if none
    /// of them marked the command known.
    pub fn dispatch(&self, command: &mut Command) -> Reply {
        let specific = self.commands.read().specific(command.name());
        trace!(target: "commands", name = %command.name(), handlers = specific.len(), "specific dispatch");
        let mut reply = specific
            .iter()
            .fold(Reply::Empty, |reply, handler| handler(command, reply));

        if !command.is_known() {
            let generic = self.commands.read().generic();
            trace!(target: "commands", name = %command.name(), handlers = generic.len(), "generic dispatch");
            reply = generic
                .iter()
                .fold(reply, |reply, handler| handler(command, reply));
        }

        reply
    }

    /// Run the help chain. Generic help runs only if no specific handler
    /// contributed any.
    pub fn collect_help(&self, command: &mut Command, terms: &str) {
        let specific = self.help.read().specific(command.name());
        for handler in &specific {
            handler(command, terms);
        }

        if command.help().is_empty() {
            let generic = self.help.read().generic();
            for handler in &generic {
                handler(command, terms);
            }
        }
    }

    /// Names with at least one specific dispatch or help handler.
    pub fn command_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.commands.read().by_name.keys().cloned().collect();
        names.extend(self.help.read().by_name.keys().cloned());
        names.into_iter().collect()
    }

    /// Total number of registered handlers across both chains.
    pub fn len(&self) -> usize {
        self.commands.read().len() + self.help.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_name(name: &str) -> String {
    name.strip_prefix('/').unwrap_or(name).to_string()
}
