//! Typed view of the configuration.
//!
//! Sections use `#[serde(default)]` so partial files work; credentials are
//! normalised after deserialization the same way the settings screen of the
//! chat integration cleans them up before saving.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::ConfigError;
use crate::auth::Credentials;
use crate::commands::help::{HelpMatcher, DEFAULT_HELP_WORD};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 18790;

/// Default bind mode.
pub const DEFAULT_BIND: &str = "loopback";

/// Default endpoint namespace.
pub const DEFAULT_NAMESPACE: &str = "/slashgate/v1";

/// Default max request body size (256KB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 262144;

/// Default log level when no filter env var is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlashgateConfig {
    pub server: ServerSection,
    pub logging: LoggingSection,
    /// Absent means the command endpoint is not registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands: Option<CommandsConfig>,
}

impl SlashgateConfig {
    /// Deserialize and normalise a raw config value.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let mut config: SlashgateConfig =
            serde_json::from_value(value.clone()).map_err(|e| ConfigError::ValidationError {
                path: ".".to_string(),
                message: e.to_string(),
            })?;
        config.normalize();
        Ok(config)
    }

    pub fn normalize(&mut self) {
        self.server.namespace = normalize_namespace(&self.server.namespace);
        if let Some(commands) = self.commands.as_mut() {
            commands.normalize();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSection {
    /// `loopback`, `all`, an IP address, or `host:port`.
    pub bind: String,
    pub port: u16,
    pub namespace: String,
    pub max_body_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            namespace: DEFAULT_NAMESPACE.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSection {
    pub level: String,
    /// `json` or `plaintext`; unset picks by environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: None,
        }
    }
}

/// The `commands` section: everything the request pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandsConfig {
    /// Whether the namespace index lists the endpoint.
    pub visible: bool,
    #[serde(alias = "help_word")]
    help_word: String,
    #[serde(flatten)]
    pub credentials: Credentials,
    /// Built from `help_word` by [`CommandsConfig::set_help_word`].
    #[serde(skip)]
    help_matcher: HelpMatcher,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            visible: false,
            help_word: DEFAULT_HELP_WORD.to_string(),
            credentials: Credentials::default(),
            help_matcher: HelpMatcher::default(),
        }
    }
}

impl CommandsConfig {
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials,
            ..Default::default()
        }
    }

    pub fn help_word(&self) -> &str {
        &self.help_word
    }

    pub fn help_matcher(&self) -> &HelpMatcher {
        &self.help_matcher
    }

    /// Trim and store the help keyword, compiling its matcher.
    ///
    /// A blank word falls back to [`DEFAULT_HELP_WORD`].
    pub fn set_help_word(&mut self, word: &str) {
        let word = word.trim();
        if word.is_empty() {
            self.help_word = DEFAULT_HELP_WORD.to_string();
            self.help_matcher = HelpMatcher::default();
            return;
        }
        match HelpMatcher::new(word) {
            Ok(matcher) => {
                self.help_word = word.to_string();
                self.help_matcher = matcher;
            }
            Err(e) => {
                warn!(target: "config", error = %e, "help word rejected, using default");
                self.help_word = DEFAULT_HELP_WORD.to_string();
                self.help_matcher = HelpMatcher::default();
            }
        }
    }

    pub fn with_help_word(mut self, word: &str) -> Self {
        self.set_help_word(word);
        self
    }

    /// Compile the help keyword and clean up credentials:
    /// - tokens and secrets are trimmed
    /// - service ids lose whitespace and `/`
    /// - empty entries are dropped
    /// - duplicates are removed, first occurrence kept
    pub fn normalize(&mut self) {
        let word = std::mem::take(&mut self.help_word);
        self.set_help_word(&word);

        let tokens = std::mem::take(&mut self.credentials.tokens);
        for (token, services) in tokens {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let entry = self
                .credentials
                .tokens
                .entry(token.to_string())
                .or_default();
            for service in services.iter().map(|s| sanitize_service_id(s)) {
                if !service.is_empty() && !entry.contains(&service) {
                    entry.push(service);
                }
            }
        }
        self.credentials.tokens.retain(|_, services| !services.is_empty());

        let secrets = std::mem::take(&mut self.credentials.secrets);
        for (service, values) in secrets {
            let service = sanitize_service_id(&service);
            if service.is_empty() {
                continue;
            }
            let entry = self.credentials.secrets.entry(service).or_default();
            for secret in values.iter().map(|s| s.trim()) {
                if !secret.is_empty() && !entry.iter().any(|s| s == secret) {
                    entry.push(secret.to_string());
                }
            }
        }
        self.credentials.secrets.retain(|_, secrets| !secrets.is_empty());
    }
}

/// Drop whitespace and `/` so the id fits in one path segment.
pub fn sanitize_service_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '/')
        .collect()
}

/// Ensure a leading slash and no trailing slash.
pub fn normalize_namespace(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_NAMESPACE.to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
