//! Turn an assistant reply into a structured plan update
//!
//! Reply scanning is an ordered list of parser functions. Each one either
//! does not recognise the reply (`None`) or claims it (`Some`), and the first
//! claim wins even when it turns out to be invalid.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::extract::extract_json;

/// Fenced code block, optional language tag
static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n(.*?)```").expect("fence regex is valid"));

static INLINE_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)\b(?:update|change|set)\s+(?:the\s+)?(?:plan\s+)?title\s+to\s*:\s*(.+)$")
        .expect("inline title regex is valid")
});

static UPDATE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)UPDATE:\s*```[A-Za-z]*[ \t]*\r?\n(.*?)```").expect("update marker regex is valid")
});

/// Part of the plan an update targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Title,
    Summary,
    Steps,
    Tags,
    /// Any subset of title, summary, steps and tags
    #[default]
    Full,
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Title => write!(f, "title"),
            Self::Summary => write!(f, "summary"),
            Self::Steps => write!(f, "steps"),
            Self::Tags => write!(f, "tags"),
            Self::Full => write!(f, "full"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Replace,
    Append,
    Prepend,
}

/// A structured change the model asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdate {
    #[serde(default)]
    pub section: Section,
    #[serde(default)]
    pub new_content: Value,
    #[serde(default)]
    pub operation: Operation,
    #[serde(default)]
    pub reason: String,
}

impl PlanUpdate {
    pub fn new(section: Section, new_content: Value, operation: Operation) -> Self {
        Self {
            section,
            new_content,
            operation,
            reason: String::new(),
        }
    }
}

/// `None` = not recognised, `Some(Err)` = recognised but invalid
type Parser = fn(&str) -> Option<Result<PlanUpdate, String>>;

/// Tried in order; first claim wins
const PARSERS: &[(&str, Parser)] = &[
    ("fenced-json", parse_fenced_json),
    ("inline-title", parse_inline_title),
    ("update-marker", parse_update_marker),
];

fn decode(block: &str) -> Result<PlanUpdate, String> {
    serde_json::from_str(&extract_json(block)).map_err(|e| e.to_string())
}

/// A fenced block whose body mentions `"section"`
pub fn parse_fenced_json(reply: &str) -> Option<Result<PlanUpdate, String>> {
    FENCE_RE
        .captures_iter(reply)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|body| body.contains("\"section\""))
        .map(decode)
}

/// "update/change/set the title to: X"
pub fn parse_inline_title(reply: &str) -> Option<Result<PlanUpdate, String>> {
    let caps = INLINE_TITLE_RE.captures(reply)?;
    let raw = caps.get(1)?.as_str().trim();
    let title = raw.trim_matches(|c| matches!(c, '"' | '\'' | '`' | '*')).trim();
    if title.is_empty() {
        return Some(Err("empty title".to_string()));
    }
    let mut update = PlanUpdate::new(Section::Title, Value::String(title.to_string()), Operation::Replace);
    update.reason = "inline title change".to_string();
    Some(Ok(update))
}

/// `UPDATE:` followed by a fenced block; a missing section means `full`
pub fn parse_update_marker(reply: &str) -> Option<Result<PlanUpdate, String>> {
    let caps = UPDATE_MARKER_RE.captures(reply)?;
    Some(decode(caps.get(1)?.as_str()))
}

/// Scan a reply for a plan update
pub fn parse_update(reply: &str) -> Option<PlanUpdate> {
    debug!(reply_len = reply.len(), "parse_update: called");
    for (name, parser) in PARSERS {
        match parser(reply) {
            None => continue,
            Some(Ok(update)) => {
                debug!(parser = %name, section = %update.section, "parse_update: matched");
                return Some(update);
            }
            Some(Err(e)) => {
                warn!(parser = %name, error = %e, "Ignoring malformed plan update");
                return None;
            }
        }
    }
    None
}
