//! Help topics and help-keyword matching.

use std::sync::LazyLock;

use regex::Regex;

/// Default help keyword.
pub const DEFAULT_HELP_WORD: &str = "help";

/// Used when no handler contributed any help.
pub const NO_HELP_MESSAGE: &str = "No help is available.";

/// Separator between rendered lines (Markdown soft break).
pub const SOFT_BREAK: &str = "  \n";

/// Help text keyed by topic, in contribution order.
///
/// Topic `""` holds untargeted help.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelpTopics {
    entries: Vec<(String, Vec<String>)>,
}

impl HelpTopics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` under `topic`, creating the topic if needed.
    pub fn add(&mut self, topic: impl Into<String>, text: impl Into<String>) {
        let topic = topic.into();
        let text = text.into();
        match self.entries.iter_mut().find(|(t, _)| *t == topic) {
            Some((_, texts)) => texts.push(text),
            None => self.entries.push((topic, vec![text])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, topic: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(t, _)| t == topic)
            .map(|(_, texts)| texts.as_slice())
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    /// Lines to show for the given (normalised) help terms.
    ///
    /// Non-empty terms naming a topic narrow the output to that topic;
    /// otherwise every topic is listed in insertion order.
    pub fn lines_for(&self, terms: &str) -> Vec<&str> {
        if !terms.is_empty() {
            if let Some(texts) = self.get(terms) {
                return texts.iter().map(String::as_str).collect();
            }
        }
        self.entries
            .iter()
            .flat_map(|(_, texts)| texts.iter().map(String::as_str))
            .collect()
    }
}

static DEFAULT_MATCHER: LazyLock<HelpMatcher> = LazyLock::new(|| {
    HelpMatcher::new(DEFAULT_HELP_WORD).expect("default help keyword pattern")
});

/// Recognises a request for help in the command text.
///
/// Compiled once per help word and kept with the config it came from.
#[derive(Debug, Clone)]
pub struct HelpMatcher {
    word: String,
    pattern: Regex,
}

impl HelpMatcher {
    /// Build a matcher for `help_word`, compared case-insensitively.
    pub fn new(help_word: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            r"(?i)\A\s*{}(?:\s+(\S.*?))?\s*\z",
            regex::escape(help_word)
        ))?;
        Ok(Self {
            word: help_word.to_string(),
            pattern,
        })
    }

    /// The keyword this matcher was built for.
    pub fn word(&self) -> &str {
        &self.word
    }

    /// The normalised help terms if `text` asks for help.
    pub fn match_terms(&self, text: &str) -> Option<String> {
        let caps = self.pattern.captures(text)?;
        Some(
            caps.get(1)
                .map(|m| normalize_terms(m.as_str()))
                .unwrap_or_default(),
        )
    }
}

impl Default for HelpMatcher {
    fn default() -> Self {
        DEFAULT_MATCHER.clone()
    }
}

impl PartialEq for HelpMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.word == other.word
    }
}

impl Eq for HelpMatcher {}

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_terms(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Join help lines after an optional preamble.
pub fn render_help(preamble: Option<&str>, help: &HelpTopics, terms: &str) -> String {
    let mut lines: Vec<&str> = preamble.into_iter().collect();
    if help.is_empty() {
        lines.push(NO_HELP_MESSAGE);
    } else {
        lines.extend(help.lines_for(terms));
    }
    lines.join(SOFT_BREAK)
}
