//! Config schema validation with typed checks and range enforcement.

use serde_json::{Map, Value};

/// Severity of a schema validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Hard error: startup must abort.
    Error,
    /// Advisory: logged but does not prevent startup.
    Warning,
}

/// A single schema validation finding.
#[derive(Debug, Clone)]
pub struct SchemaIssue {
    pub severity: Severity,
    pub path: String,
    pub message: String,
}

impl SchemaIssue {
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Known top-level configuration keys.
const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["server", "logging", "commands"];

/// Validate a config value against the full schema.
///
/// Returns a (possibly empty) list of issues. Callers should inspect each
/// issue's `severity` to decide whether to abort or merely warn.
pub fn validate_schema(config: &Value) -> Vec<SchemaIssue> {
    let mut issues = Vec::new();

    let obj = match config.as_object() {
        Some(o) => o,
        None => {
            issues.push(SchemaIssue::error(".", "Config root must be an object"));
            return issues;
        }
    };

    for key in obj.keys() {
        if !KNOWN_TOP_LEVEL_KEYS.contains(&key.as_str()) {
            issues.push(SchemaIssue::warning(
                format!(".{}", key),
                format!("Unknown configuration key: {}", key),
            ));
        }
    }

    validate_server(obj, &mut issues);
    validate_logging(obj, &mut issues);
    validate_commands(obj, &mut issues);

    issues
}

/// True if any issue is an error.
pub fn has_errors(issues: &[SchemaIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

// ---------------------------------------------------------------------------
// Per-section validators
// ---------------------------------------------------------------------------

fn validate_server(obj: &Map<String, Value>, issues: &mut Vec<SchemaIssue>) {
    let server = match obj.get("server") {
        Some(Value::Object(s)) => s,
        Some(_) => {
            issues.push(SchemaIssue::error(".server", "server must be an object"));
            return;
        }
        None => return,
    };

    // .server.port: integer, 1..=65535
    if let Some(port) = server.get("port") {
        match port.as_u64() {
            Some(p) if (1..=65535).contains(&p) => {}
            Some(p) => issues.push(SchemaIssue::error(
                ".server.port",
                format!("port must be between 1 and 65535, got {}", p),
            )),
            None => issues.push(SchemaIssue::error(
                ".server.port",
                "port must be a positive integer",
            )),
        }
    }

    if let Some(bind) = server.get("bind") {
        match bind.as_str() {
            Some(s) => {
                let known = ["loopback", "localhost", "local", "all", "auto"];
                let lowered = s.trim().to_lowercase();
                if !known.contains(&lowered.as_str())
                    && s.parse::<std::net::IpAddr>().is_err()
                    && s.parse::<std::net::SocketAddr>().is_err()
                {
                    issues.push(SchemaIssue::warning(
                        ".server.bind",
                        format!(
                            "bind should be loopback/all, an IP address or ip:port, got \"{}\"",
                            s
                        ),
                    ));
                }
            }
            None => issues.push(SchemaIssue::error(".server.bind", "bind must be a string")),
        }
    }

    if let Some(ns) = server.get("namespace") {
        match ns.as_str() {
            Some(s) if s.starts_with('/') => {}
            Some(_) => issues.push(SchemaIssue::warning(
                ".server.namespace",
                "namespace should start with '/'",
            )),
            None => issues.push(SchemaIssue::error(
                ".server.namespace",
                "namespace must be a string",
            )),
        }
    }

    if let Some(max_bytes) = server.get("maxBodyBytes") {
        check_positive_integer(max_bytes, ".server.maxBodyBytes", issues);
    }
}

fn validate_logging(obj: &Map<String, Value>, issues: &mut Vec<SchemaIssue>) {
    let logging = match obj.get("logging") {
        Some(Value::Object(l)) => l,
        Some(_) => {
            issues.push(SchemaIssue::error(".logging", "logging must be an object"));
            return;
        }
        None => return,
    };

    if logging.get("level").is_some_and(|v| !v.is_string()) {
        issues.push(SchemaIssue::error(".logging.level", "level must be a string"));
    }
    if logging
        .get("format")
        .is_some_and(|v| !v.is_string() && !v.is_null())
    {
        issues.push(SchemaIssue::error(".logging.format", "format must be a string"));
    }

    if let Some(level) = logging.get("level").and_then(|v| v.as_str()) {
        let valid = ["trace", "debug", "info", "warn", "error"];
        if !valid.contains(&level) {
            issues.push(SchemaIssue::warning(
                ".logging.level",
                format!(
                    "level should be one of trace/debug/info/warn/error, got \"{}\"",
                    level
                ),
            ));
        }
    }

    if let Some(format) = logging.get("format").and_then(|v| v.as_str()) {
        if !["json", "plaintext"].contains(&format) {
            issues.push(SchemaIssue::warning(
                ".logging.format",
                format!("format should be json or plaintext, got \"{}\"", format),
            ));
        }
    }
}

fn validate_commands(obj: &Map<String, Value>, issues: &mut Vec<SchemaIssue>) {
    let commands = match obj.get("commands") {
        Some(Value::Object(c)) => c,
        Some(_) => {
            issues.push(SchemaIssue::error(".commands", "commands must be an object"));
            return;
        }
        None => return,
    };

    if let Some(visible) = commands.get("visible") {
        if !visible.is_boolean() {
            issues.push(SchemaIssue::error(
                ".commands.visible",
                "visible must be a boolean",
            ));
        }
    }

    if commands.contains_key("helpWord") && commands.contains_key("help_word") {
        issues.push(SchemaIssue::error(
            ".commands.help_word",
            "set either helpWord or help_word, not both",
        ));
    }

    let help_word = commands
        .get("helpWord")
        .or_else(|| commands.get("help_word"));
    if let Some(word) = help_word {
        match word.as_str() {
            Some(w) if w.trim().is_empty() => issues.push(SchemaIssue::warning(
                ".commands.helpWord",
                "helpWord is empty; \"help\" will be used",
            )),
            Some(w) if w.trim().contains(char::is_whitespace) => {
                issues.push(SchemaIssue::warning(
                    ".commands.helpWord",
                    "helpWord should be a single word",
                ))
            }
            Some(_) => {}
            None => issues.push(SchemaIssue::error(
                ".commands.helpWord",
                "helpWord must be a string",
            )),
        }
    }

    check_string_list_map(commands.get("tokens"), ".commands.tokens", issues);
    check_string_list_map(commands.get("secrets"), ".commands.secrets", issues);

    let has_tokens = commands
        .get("tokens")
        .and_then(|v| v.as_object())
        .is_some_and(|m| !m.is_empty());
    let has_secrets = commands
        .get("secrets")
        .and_then(|v| v.as_object())
        .is_some_and(|m| !m.is_empty());
    if !has_tokens && !has_secrets {
        issues.push(SchemaIssue::warning(
            ".commands",
            "no tokens or secrets configured; every request will be rejected",
        ));
    }

    if let Some(secrets) = commands.get("secrets").and_then(|v| v.as_object()) {
        for (service, values) in secrets {
            if values.as_array().is_some_and(|a| a.is_empty()) {
                issues.push(SchemaIssue::warning(
                    format!(".commands.secrets.{}", service),
                    "service has no secrets",
                ));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_positive_integer(value: &Value, path: &str, issues: &mut Vec<SchemaIssue>) {
    match value.as_u64() {
        Some(n) if n > 0 => {}
        _ => issues.push(SchemaIssue::error(path, "must be a positive integer")),
    }
}

fn check_string_list_map(value: Option<&Value>, path: &str, issues: &mut Vec<SchemaIssue>) {
    let map = match value {
        Some(Value::Object(m)) => m,
        Some(_) => {
            issues.push(SchemaIssue::error(path, "must be an object of string arrays"));
            return;
        }
        None => return,
    };

    for (key, list) in map {
        let ok = list
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string));
        if !ok {
            issues.push(SchemaIssue::error(
                format!("{}.{}", path, key),
                "must be an array of strings",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(issues: &[SchemaIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.path.as_str()).collect()
    }

    // --- valid config passes ---

    #[test]
    fn test_valid_config_no_issues() {
        let config = json!({
            "server": { "port": 8080, "bind": "loopback", "namespace": "/slash", "maxBodyBytes": 1024 },
            "logging": { "level": "debug", "format": "json" },
            "commands": {
                "visible": true,
                "helpWord": "help",
                "tokens": { "abc": ["ops"] },
                "secrets": { "ops": ["s"] }
            }
        });
        let issues = validate_schema(&config);
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn test_empty_config_no_issues() {
        assert!(validate_schema(&json!({})).is_empty());
    }

    #[test]
    fn test_root_not_object() {
        let issues = validate_schema(&json!([1]));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn test_unknown_key_warns() {
        let issues = validate_schema(&json!({ "gateway": {} }));
        assert_eq!(paths(&issues), vec![".gateway"]);
        assert_eq!(issues[0].severity, Severity::Warning);
    }

    // --- server ---

    #[test]
    fn test_port_range() {
        for bad in [json!(0), json!(70000), json!("80")] {
            let issues = validate_schema(&json!({ "server": { "port": bad } }));
            assert!(has_errors(&issues));
        }
        assert!(validate_schema(&json!({ "server": { "port": 65535 } })).is_empty());
    }

    #[test]
    fn test_bind_values() {
        for ok in ["loopback", "all", "0.0.0.0", "127.0.0.1:9000"] {
            assert!(validate_schema(&json!({ "server": { "bind": ok } })).is_empty());
        }
        let issues = validate_schema(&json!({ "server": { "bind": "tailnet" } }));
        assert_eq!(issues[0].severity, Severity::Warning);
    }

    #[test]
    fn test_namespace_without_slash_warns() {
        let issues = validate_schema(&json!({ "server": { "namespace": "slash" } }));
        assert_eq!(paths(&issues), vec![".server.namespace"]);
        assert_eq!(issues[0].severity, Severity::Warning);
    }

    #[test]
    fn test_max_body_bytes_positive() {
        let issues = validate_schema(&json!({ "server": { "maxBodyBytes": 0 } }));
        assert!(has_errors(&issues));
    }

    // --- logging ---

    #[test]
    fn test_logging_values() {
        let issues = validate_schema(&json!({ "logging": { "level": "loud", "format": "xml" } }));
        assert_eq!(paths(&issues), vec![".logging.level", ".logging.format"]);
        assert!(!has_errors(&issues));
    }

    // --- commands ---

    #[test]
    fn test_commands_without_credentials_warns() {
        let issues = validate_schema(&json!({ "commands": { "visible": true } }));
        assert_eq!(paths(&issues), vec![".commands"]);
        assert!(!has_errors(&issues));
    }

    #[test]
    fn test_commands_not_object() {
        let issues = validate_schema(&json!({ "commands": true }));
        assert!(has_errors(&issues));
    }

    #[test]
    fn test_help_word_checks() {
        let issues = validate_schema(&json!({
            "commands": { "helpWord": "", "tokens": { "a": ["b"] } }
        }));
        assert_eq!(paths(&issues), vec![".commands.helpWord"]);

        let issues = validate_schema(&json!({
            "commands": { "helpWord": "get help", "tokens": { "a": ["b"] } }
        }));
        assert_eq!(paths(&issues), vec![".commands.helpWord"]);

        let issues = validate_schema(&json!({
            "commands": { "helpWord": 3, "tokens": { "a": ["b"] } }
        }));
        assert!(has_errors(&issues));
    }

    #[test]
    fn test_visible_must_be_boolean() {
        let issues = validate_schema(&json!({
            "commands": { "visible": "yes", "tokens": { "a": ["b"] } }
        }));
        assert_eq!(paths(&issues), vec![".commands.visible"]);
        assert!(has_errors(&issues));
    }

    #[test]
    fn test_section_shapes() {
        for bad in [
            json!({ "server": [] }),
            json!({ "logging": "debug" }),
            json!({ "logging": { "level": 3 } }),
            json!({ "logging": { "format": false } }),
        ] {
            assert!(has_errors(&validate_schema(&bad)), "{bad}");
        }
        assert!(validate_schema(&json!({ "logging": { "format": null } })).is_empty());
    }

    /// Anything the typed config refuses must be a schema error, so startup
    /// can report it with a path instead of a deserializer message.
    #[test]
    fn test_rejected_configs_are_schema_errors() {
        use crate::config::SlashgateConfig;

        let rejected = [
            json!([1]),
            json!({ "server": null }),
            json!({ "server": { "port": "80" } }),
            json!({ "server": { "port": 70000 } }),
            json!({ "server": { "bind": 1 } }),
            json!({ "server": { "namespace": false } }),
            json!({ "server": { "maxBodyBytes": -1 } }),
            json!({ "logging": { "level": ["info"] } }),
            json!({ "commands": { "visible": "yes" } }),
            json!({ "commands": { "visible": null } }),
            json!({ "commands": { "helpWord": 1 } }),
            json!({ "commands": { "helpWord": "a", "help_word": "b" } }),
            json!({ "commands": { "tokens": { "t": "ops" } } }),
            json!({ "commands": { "secrets": [] } }),
        ];
        for value in rejected {
            assert!(SlashgateConfig::from_value(&value).is_err(), "{value}");
            assert!(has_errors(&validate_schema(&value)), "{value}");
        }
    }

    #[test]
    fn test_credential_shapes() {
        let issues = validate_schema(&json!({
            "commands": {
                "tokens": { "abc": "ops" },
                "secrets": { "ops": [1] }
            }
        }));
        assert!(has_errors(&issues));
        assert!(paths(&issues).contains(&".commands.tokens.abc"));
        assert!(paths(&issues).contains(&".commands.secrets.ops"));
    }

    #[test]
    fn test_service_without_secrets_warns() {
        let issues = validate_schema(&json!({
            "commands": { "secrets": { "ops": [] } }
        }));
        assert_eq!(paths(&issues), vec![".commands.secrets.ops"]);
    }
}
