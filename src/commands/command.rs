//! The command entity handed to handlers.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;
use url::Url;

use super::delayed::{DelayedDelivery, DelayedResponder, DelayedResponseError};
use super::help::HelpTopics;

/// Body field carrying the command name.
pub const COMMAND_FIELD: &str = "command";
/// Body field carrying the command arguments.
pub const TEXT_FIELD: &str = "text";
/// Body field carrying the shared token; never retained.
pub const TOKEN_FIELD: &str = "token";
/// Body field carrying the delayed response URL.
pub const RESPONSE_URL_FIELD: &str = "response_url";

/// A request that authenticated but does not describe a usable command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Invalid slash command.")]
    Invalid,
    #[error("Empty slash command.")]
    Empty,
    #[error("Response URL looks malformed.")]
    MalformedResponseUrl,
}

impl CommandError {
    /// Message returned to the caller.
    pub fn public_message(self) -> &'static str {
        match self {
            CommandError::Invalid => "Invalid slash command.",
            CommandError::Empty => "Empty slash command.",
            CommandError::MalformedResponseUrl => "Response URL looks malformed.",
        }
    }
}

/// A validated slash command.
///
/// Everything except the `known`/`handled` flags and the help topics is fixed
/// at construction. Marking a command handled also marks it known.
#[derive(Debug, Clone)]
pub struct Command {
    service_id: String,
    name: String,
    response_url: Option<Url>,
    data: BTreeMap<String, String>,
    known: bool,
    handled: bool,
    help: HelpTopics,
}

impl Command {
    /// Validate request fields for an authenticated service.
    pub fn new(
        mut data: BTreeMap<String, String>,
        service_id: impl Into<String>,
    ) -> Result<Self, CommandError> {
        let raw = data
            .get(COMMAND_FIELD)
            .map(String::as_str)
            .filter(|c| !c.is_empty())
            .ok_or(CommandError::Invalid)?;
        let name = raw.strip_prefix('/').unwrap_or(raw).to_string();
        if name.is_empty() {
            return Err(CommandError::Empty);
        }

        let response_url = match data.get(RESPONSE_URL_FIELD).filter(|u| !u.is_empty()) {
            Some(raw) => Some(parse_response_url(raw)?),
            None => None,
        };

        data.remove(TOKEN_FIELD);

        Ok(Self {
            service_id: service_id.into(),
            name,
            response_url,
            data,
            known: false,
            handled: false,
            help: HelpTopics::new(),
        })
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Command name without the leading slash.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn response_url(&self) -> Option<&Url> {
        self.response_url.as_ref()
    }

    /// All request fields except the token.
    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Command arguments (the `text` field), empty when absent.
    pub fn text(&self) -> &str {
        self.field(TEXT_FIELD).unwrap_or_default()
    }

    pub fn is_known(&self) -> bool {
        self.known
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Some handler recognised the command.
    pub fn mark_known(&mut self) -> &mut Self {
        self.known = true;
        self
    }

    /// The command was fully handled. Implies known.
    pub fn mark_handled(&mut self) -> &mut Self {
        self.handled = true;
        self.known = true;
        self
    }

    pub fn help(&self) -> &HelpTopics {
        &self.help
    }

    /// Append `text` under each of `topics`.
    pub fn add_help<I, T>(&mut self, topics: I, text: impl Into<String>) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let text = text.into();
        for topic in topics {
            self.help.add(topic, text.clone());
        }
        self
    }

    /// Append help not tied to a topic.
    pub fn add_general_help(&mut self, text: impl Into<String>) -> &mut Self {
        self.help.add("", text);
        self
    }

    pub fn can_respond_delayed(&self) -> bool {
        self.response_url.is_some()
    }

    /// Responder for this command's response URL.
    pub fn delayed_responder(&self) -> Result<DelayedResponder, DelayedResponseError> {
        self.response_url
            .clone()
            .map(DelayedResponder::new)
            .ok_or(DelayedResponseError::NoResponseUrl)
    }

    /// Send a follow-up text message in the background.
    pub fn respond_delayed(
        &self,
        text: impl Into<String>,
    ) -> Result<DelayedDelivery, DelayedResponseError> {
        self.delayed_responder()?.spawn_text(text)
    }

    /// Send a follow-up JSON message in the background.
    pub fn respond_delayed_rich(
        &self,
        payload: Value,
    ) -> Result<DelayedDelivery, DelayedResponseError> {
        self.delayed_responder()?.spawn_rich(payload)
    }
}

/// Absolute `http`/`https` URL with a host and an explicit path.
fn parse_response_url(raw: &str) -> Result<Url, CommandError> {
    let url = Url::parse(raw).map_err(|_| CommandError::MalformedResponseUrl)?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(CommandError::MalformedResponseUrl);
    }
    // Url normalises a missing path to "/", so look at the raw authority tail.
    let has_path = raw
        .split_once("://")
        .and_then(|(_, rest)| rest.find(['/', '?', '#']).map(|i| rest[i..].starts_with('/')))
        .unwrap_or(false);
    if !has_path {
        return Err(CommandError::MalformedResponseUrl);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_name_strips_one_leading_slash() {
        let cmd = Command::new(fields(&[("command", "/deploy")]), "svc").unwrap();
        assert_eq!(cmd.name(), "deploy");
        assert_eq!(cmd.service_id(), "svc");

        let cmd = Command::new(fields(&[("command", "//deploy")]), "svc").unwrap();
        assert_eq!(cmd.name(), "/deploy");

        let cmd = Command::new(fields(&[("command", "deploy")]), "svc").unwrap();
        assert_eq!(cmd.name(), "deploy");
    }

    #[test]
    fn test_missing_or_empty_command() {
        assert_eq!(
            Command::new(fields(&[("text", "x")]), "svc").unwrap_err(),
            CommandError::Invalid
        );
        assert_eq!(
            Command::new(fields(&[("command", "")]), "svc").unwrap_err(),
            CommandError::Invalid
        );
        assert_eq!(
            Command::new(fields(&[("command", "/")]), "svc").unwrap_err(),
            CommandError::Empty
        );
    }

    #[test]
    fn test_token_is_not_retained() {
        let cmd = Command::new(
            fields(&[("command", "/deploy"), ("token", "s3cret"), ("user_name", "ana")]),
            "svc",
        )
        .unwrap();
        assert!(cmd.field("token").is_none());
        assert!(!cmd.data().values().any(|v| v == "s3cret"));
        assert_eq!(cmd.field("user_name"), Some("ana"));
        assert_eq!(cmd.field("command"), Some("/deploy"));
    }

    #[test]
    fn test_text_defaults_to_empty() {
        let cmd = Command::new(fields(&[("command", "/x")]), "svc").unwrap();
        assert_eq!(cmd.text(), "");
        let cmd = Command::new(fields(&[("command", "/x"), ("text", "a b")]), "svc").unwrap();
        assert_eq!(cmd.text(), "a b");
    }

    #[test]
    fn test_response_url_accepted() {
        let cmd = Command::new(
            fields(&[
                ("command", "/x"),
                ("response_url", "https://hooks.slack.com/commands/T1/2/abc"),
            ]),
            "svc",
        )
        .unwrap();
        assert!(cmd.can_respond_delayed());
        assert_eq!(
            cmd.response_url().unwrap().as_str(),
            "https://hooks.slack.com/commands/T1/2/abc"
        );
    }

    #[test]
    fn test_empty_response_url_is_ignored() {
        let cmd = Command::new(fields(&[("command", "/x"), ("response_url", "")]), "svc").unwrap();
        assert!(!cmd.can_respond_delayed());
        assert_eq!(
            cmd.delayed_responder().unwrap_err(),
            DelayedResponseError::NoResponseUrl
        );
        assert!(matches!(
            cmd.respond_delayed("late"),
            Err(DelayedResponseError::NoResponseUrl)
        ));
    }

    #[test]
    fn test_response_url_rejected() {
        for bad in [
            "not a url",
            "ftp://example.com/path",
            "https://example.com",
            "https://example.com?x=/y",
            "mailto:someone@example.com",
            "/relative/path",
        ] {
            let result = Command::new(fields(&[("command", "/x"), ("response_url", bad)]), "svc");
            assert_eq!(
                result.unwrap_err(),
                CommandError::MalformedResponseUrl,
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_handled_implies_known() {
        let mut cmd = Command::new(fields(&[("command", "/x")]), "svc").unwrap();
        assert!(!cmd.is_known());
        assert!(!cmd.is_handled());

        cmd.mark_handled();
        assert!(cmd.is_known());
        assert!(cmd.is_handled());
    }

    #[test]
    fn test_known_does_not_imply_handled() {
        let mut cmd = Command::new(fields(&[("command", "/x")]), "svc").unwrap();
        cmd.mark_known();
        assert!(cmd.is_known());
        assert!(!cmd.is_handled());
    }

    #[test]
    fn test_add_help_to_several_topics() {
        let mut cmd = Command::new(fields(&[("command", "/x")]), "svc").unwrap();
        cmd.add_help(["deploy", "release"], "deploy <env>")
            .add_general_help("try `help deploy`");
        assert_eq!(cmd.help().get("deploy").unwrap(), ["deploy <env>".to_string()]);
        assert_eq!(cmd.help().get("release").unwrap(), ["deploy <env>".to_string()]);
        assert_eq!(cmd.help().get("").unwrap(), ["try `help deploy`".to_string()]);
    }

    #[test]
    fn test_public_messages() {
        assert_eq!(CommandError::Invalid.public_message(), "Invalid slash command.");
        assert_eq!(CommandError::Empty.public_message(), "Empty slash command.");
        assert_eq!(
            CommandError::MalformedResponseUrl.public_message(),
            "Response URL looks malformed."
        );
    }
}
