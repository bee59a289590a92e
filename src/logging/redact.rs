//! Secret masking for logs and printed configuration.
//!
//! Scrubs shared tokens, request signatures and bearer credentials from log
//! output, and masks the credential maps when a config is displayed.

use regex::Regex;
use serde_json::Value;
use std::io::{self, Write};
use std::sync::LazyLock;
use tracing_subscriber::fmt::MakeWriter;

pub const REDACTED: &str = "[REDACTED]";

const SECRET_KEY_NAMES: &[&str] = &["token", "secret", "password", "signature"];

static RE_BEARER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Bearer [a-zA-Z0-9._\-]+").expect("failed to compile regex: bearer")
});

static RE_FORM_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(token|secret)=([^&\s]+)").expect("failed to compile regex: form_token")
});

static RE_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bv0=[0-9a-fA-F]{16,}").expect("failed to compile regex: signature")
});

pub struct RedactingWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
}

const MAX_BUFFER_BYTES: usize = 8192;

impl<W: Write> RedactingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
        }
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&self.buffer);
        let redacted = redact_string(&text);
        self.inner.write_all(redacted.as_bytes())?;
        self.buffer.fill(0);
        self.buffer.clear();
        Ok(())
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.buffer.extend_from_slice(buf);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            let redacted = redact_string(&String::from_utf8_lossy(&line));
            self.inner.write_all(redacted.as_bytes())?;
            self.inner.write_all(b"\n")?;
            line.fill(0);
        }
        if self.buffer.len() > MAX_BUFFER_BYTES {
            self.flush_buffer()?;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()?;
        self.inner.flush()
    }
}

impl<W: Write> Drop for RedactingWriter<W> {
    fn drop(&mut self) {
        let _ = self.flush_buffer();
        let _ = self.inner.flush();
    }
}

pub struct RedactingMakeWriter<M> {
    inner: M,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
    M::Writer: Write,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new(self.inner.make_writer())
    }
}

pub fn redact_string(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let mut result = RE_BEARER.replace_all(input, REDACTED).into_owned();
    result = RE_FORM_TOKEN
        .replace_all(&result, "$1=[REDACTED]")
        .into_owned();
    result = RE_SIGNATURE
        .replace_all(&result, "v0=[REDACTED]")
        .into_owned();
    result
}

/// Mask string values under secret-looking keys.
pub fn redact_json_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let lower = key.to_lowercase();
                if SECRET_KEY_NAMES.iter().any(|s| lower.contains(s)) && child.is_string() {
                    *child = Value::String(REDACTED.to_string());
                } else {
                    redact_json_value(child);
                }
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                redact_json_value(item);
            }
        }
        _ => {}
    }
}

/// Mask a `commands` section for display.
///
/// Token map keys are the tokens themselves, so they are replaced by
/// numbered placeholders; secret lists keep their length.
pub fn redact_credentials(commands: &mut Value) {
    let Some(obj) = commands.as_object_mut() else {
        return;
    };

    if let Some(Value::Object(tokens)) = obj.get_mut("tokens") {
        let masked: serde_json::Map<String, Value> = std::mem::take(tokens)
            .into_iter()
            .enumerate()
            .map(|(i, (_, services))| (format!("{}#{}", REDACTED, i + 1), services))
            .collect();
        *tokens = masked;
    }

    if let Some(Value::Object(secrets)) = obj.get_mut("secrets") {
        for list in secrets.values_mut() {
            if let Value::Array(items) = list {
                for item in items.iter_mut() {
                    *item = Value::String(REDACTED.to_string());
                }
            }
        }
    }
}

pub struct RedactedDisplay<T: std::fmt::Display>(pub T);

impl<T: std::fmt::Display> std::fmt::Display for RedactedDisplay<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&redact_string(&self.0.to_string()))
    }
}
