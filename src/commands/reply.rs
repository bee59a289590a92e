//! Values flowing out of the handler chain.

use serde_json::Value;

/// Reply accumulated across dispatch handlers.
///
/// Each handler receives the reply produced so far and returns the one to
/// keep, so the last writer wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Reply {
    #[default]
    Empty,
    Text(String),
    /// Structured payload (e.g. Slack blocks).
    Rich(Value),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }

    pub fn rich(payload: Value) -> Self {
        Reply::Rich(payload)
    }

    /// Objects and arrays are returned as structured payloads; everything
    /// else is rendered as text.
    pub fn is_structured(&self) -> bool {
        matches!(self, Reply::Rich(Value::Object(_) | Value::Array(_)))
    }

    /// Render as plain text. `null` and `false` render as nothing.
    pub fn into_text(self) -> String {
        match self {
            Reply::Empty => String::new(),
            Reply::Text(text) => text,
            Reply::Rich(Value::Null | Value::Bool(false)) => String::new(),
            Reply::Rich(Value::String(text)) => text,
            Reply::Rich(value) => value.to_string(),
        }
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::Text(text.to_string())
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::Text(text)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Rich(value)
    }
}

/// Final immediate response for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No content (`ssl_check`).
    Empty,
    /// `text/plain` body.
    Text(String),
    /// JSON body.
    Rich(Value),
}

impl Outcome {
    pub fn text(text: impl Into<String>) -> Self {
        Outcome::Text(text.into())
    }
}
