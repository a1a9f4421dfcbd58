//! Hints carried in the response prose, and filename selection.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::domain::FilenameOrigin;

static TIMEOUT_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)TIMEOUT:\s*(\d+)").expect("constant regex pattern is valid"));

static DEPENDENCY_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\W*(?:DEPENDENCIES|INSTALL):[ \t]*(.+)$").expect("constant regex pattern is valid")
});

static FILENAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\*\*(\w[\w.-]*\.\w+)\*\*",
        r"(?m)^###?\s+`?(\w[\w.-]*\.\w+)`?",
        r"`(\w[\w.-]*\.\w+)`",
        r#"(?i)save\s+(?:it\s+)?as\s+[`"']?(\w[\w.-]*\.\w+)"#,
        r#"(?i)(?:file|name)\s+(?:it\s+)?(?:called|named)\s+[`"']?(\w[\w.-]*\.\w+)"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("constant regex pattern is valid"))
    .collect()
});

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9]+").expect("constant regex pattern is valid"));

/// Values the assistant writes when it means "no dependencies".
const NO_DEPENDENCY_SENTINELS: &[&str] = &["none", "n/a", "no", "null", "-", "0", ""];

/// Words dropped when building a filename from the prompt.
const FILLER_WORDS: &[&str] = &[
    "make", "me", "a", "an", "the", "that", "which", "write", "create", "generate", "build",
    "in", "on", "for", "to", "and", "with", "of", "please", "can", "you",
];

const MAX_FILENAME_LEN: usize = 60;

/// Structured hints found in a response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHints {
    /// Execution timeout requested by the assistant, already clamped
    pub timeout_secs: Option<u64>,
    /// Declared third-party packages
    pub dependencies: Vec<String>,
    /// Filenames mentioned in the prose, in order of appearance
    pub filenames: Vec<String>,
}

impl ResponseHints {
    pub fn parse(text: &str, min_timeout: u64, max_timeout: u64) -> Self {
        Self {
            timeout_secs: timeout_hint(text, min_timeout, max_timeout),
            dependencies: dependency_hint(text),
            filenames: filename_hints(text),
        }
    }
}

/// `TIMEOUT: <seconds>`, clamped to `[min, max]`.
pub fn timeout_hint(text: &str, min: u64, max: u64) -> Option<u64> {
    let caps = TIMEOUT_HINT.captures(text)?;
    let value: u64 = caps.get(1)?.as_str().parse().ok()?;
    Some(value.clamp(min, max))
}

/// `DEPENDENCIES: a, b` or `INSTALL: a b`, without the "none" sentinels.
pub fn dependency_hint(text: &str) -> Vec<String> {
    let Some(raw) = DEPENDENCY_HINT.captures(text).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    let raw = raw.as_str().trim();
    let raw = raw
        .strip_prefix("pip3 install")
        .or_else(|| raw.strip_prefix("pip install"))
        .unwrap_or(raw);

    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(|d| d.trim_matches(|c: char| c == '`' || c == '"' || c == '\'' || c == '.'))
        .filter(|d| {
            let lowered = d.to_lowercase();
            !NO_DEPENDENCY_SENTINELS.contains(&lowered.trim_matches(|c: char| c == '(' || c == ')'))
        })
        .map(str::to_string)
        .collect()
}

/// Every filename the prose mentions, deduplicated, in pattern order.
pub fn filename_hints(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut hints = Vec::new();
    for pattern in FILENAME_PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            let Some(name) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if name.len() < MAX_FILENAME_LEN && seen.insert(name.to_string()) {
                hints.push(name.to_string());
            }
        }
    }
    hints
}

/// Up to four meaningful words of the prompt joined by `_`, or "program".
pub fn prompt_slug(prompt: &str) -> String {
    let lowered = prompt.to_lowercase();
    let words: Vec<&str> = WORD
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| w.len() > 1 && !FILLER_WORDS.contains(w))
        .take(4)
        .collect();
    if words.is_empty() {
        "program".to_string()
    } else {
        words.join("_")
    }
}

/// Hands out filenames for kept blocks.
///
/// A hint with the block's extension is used once; otherwise the prompt
/// slug names the file, numbered when more than one block is kept.
pub struct FilenameAllocator {
    hints: Vec<String>,
    slug: String,
    total: usize,
}

impl FilenameAllocator {
    pub fn new(hints: Vec<String>, prompt: &str, total: usize) -> Self {
        Self {
            hints,
            slug: prompt_slug(prompt),
            total,
        }
    }

    /// Filename for the `index`-th (0-based) kept block with this extension.
    pub fn allocate(&mut self, extension: &str, index: usize) -> (String, FilenameOrigin) {
        if let Some(pos) = self
            .hints
            .iter()
            .position(|h| !extension.is_empty() && h.to_lowercase().ends_with(extension))
        {
            return (self.hints.remove(pos), FilenameOrigin::Response);
        }
        let name = if self.total <= 1 {
            format!("{}{}", self.slug, extension)
        } else {
            format!("{}_{}{}", self.slug, index + 1, extension)
        };
        (name, FilenameOrigin::Generated)
    }
}
