//! Task intent read from the prompt.

use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

fn set(patterns: &[&str]) -> RegexSet {
    RegexSet::new(patterns).expect("constant regex pattern is valid")
}

static KILL_WORDS: LazyLock<RegexSet> =
    LazyLock::new(|| set(&[r"\bkill\b", r"\bstop\b", r"\bterminate\b", r"\bhalt\b"]));

static PROCESS_WORDS: LazyLock<RegexSet> = LazyLock::new(|| {
    set(&[
        r"\bprocess(?:es)?\b",
        r"\bscript\b",
        r"\bprogram\b",
        r"\brunning\b",
        r"\bcounter\b",
        r"\binfinite\b",
        r"\brunaway\b",
    ])
});

static DELETE_WORDS: LazyLock<RegexSet> =
    LazyLock::new(|| set(&[r"\bdelete\b", r"\bremove\b", r"\bwipe\b"]));

static CREATE_WORDS: LazyLock<RegexSet> = LazyLock::new(|| {
    set(&[
        r"\bcreate\b",
        r"\bgenerate\b",
        r"\bwrite\b",
        r"\bmake\b",
        r"\bbuild\b",
    ])
});

static FILE_WORDS: LazyLock<RegexSet> = LazyLock::new(|| {
    set(&[r"\bfile\b", r"\btxt\b", r"\boutput\b", r"\bsave\b", r"\btext\b"])
});

static SCRIPT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\w+)\.py\b").expect("constant regex pattern is valid"));

static NAMED_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"((?:~/|/)?(?:[\w.-]+/)*[\w-]+\.[A-Za-z0-9]+)\b").expect("constant regex pattern is valid")
});

static OUTPUT_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([\w-]+\.(?:txt|log|csv))\b").expect("constant regex pattern is valid")
});

/// Process descriptors and the keyword each contributes.
const DESCRIPTORS: &[(&str, &str)] = &[
    (r"\binfinite\s+counter\b", "infinite_counter"),
    (r"\bcounter\b", "counter"),
    (r"\binfinite\b", "infinite"),
    (r"\bloop\b", "loop"),
];

static DESCRIPTOR_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    DESCRIPTORS
        .iter()
        .map(|(p, k)| (Regex::new(p).expect("constant regex pattern is valid"), *k))
        .collect()
});

/// Keywords used when the prompt names nothing recognisable.
const DEFAULT_KEYWORDS: &[&str] = &["counter", "infinite"];

/// What a task is supposed to change on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    KillProcess,
    DeleteFile,
    CreateFile,
    None,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::KillProcess => "kill_process",
            Intent::DeleteFile => "delete_file",
            Intent::CreateFile => "create_file",
            Intent::None => "none",
        }
    }
}

/// Intent of a prompt; kill is checked before delete, delete before create.
pub fn classify_intent(prompt: &str) -> Intent {
    let p = prompt.to_lowercase();
    if KILL_WORDS.is_match(&p) && PROCESS_WORDS.is_match(&p) {
        Intent::KillProcess
    } else if DELETE_WORDS.is_match(&p) {
        Intent::DeleteFile
    } else if CREATE_WORDS.is_match(&p) && FILE_WORDS.is_match(&p) {
        Intent::CreateFile
    } else {
        Intent::None
    }
}

/// Command-line fragments that identify the process a kill task targets.
pub fn target_keywords(prompt: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    let mut push = |k: String| {
        if !keywords.contains(&k) {
            keywords.push(k);
        }
    };

    if let Some(caps) = SCRIPT_NAME.captures(prompt) {
        let stem = caps[1].to_string();
        push(format!("{}.py", stem));
        push(stem);
    }
    let lowered = prompt.to_lowercase();
    for (pattern, keyword) in DESCRIPTOR_PATTERNS.iter() {
        if pattern.is_match(&lowered) {
            push(keyword.to_string());
        }
    }

    if keywords.is_empty() {
        DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
    } else {
        keywords
    }
}

/// Every path-like file name in the prompt, in order, deduplicated.
pub fn named_files(prompt: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for caps in NAMED_FILE.captures_iter(prompt) {
        let name = caps[1].to_string();
        if !files.contains(&name) {
            files.push(name);
        }
    }
    files
}

/// The output file a long-running task writes to, if the prompt names one.
pub fn output_file(prompt: &str) -> Option<String> {
    OUTPUT_FILE.captures(prompt).map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_intent_needs_process_word() {
        assert_eq!(classify_intent("kill the infinite counter"), Intent::KillProcess);
        assert_eq!(classify_intent("Terminate the running script"), Intent::KillProcess);
        assert_eq!(classify_intent("stop"), Intent::None);
    }

    #[test]
    fn test_intent_order() {
        assert_eq!(classify_intent("delete the process log file"), Intent::DeleteFile);
        assert_eq!(classify_intent("stop the process and delete its log"), Intent::KillProcess);
        assert_eq!(classify_intent("remove old.txt"), Intent::DeleteFile);
        assert_eq!(classify_intent("write the results to an output file"), Intent::CreateFile);
        assert_eq!(classify_intent("write a fizzbuzz for local"), Intent::None);
    }

    #[test]
    fn test_target_keywords_from_script_name() {
        assert_eq!(
            target_keywords("kill counter.py on the pi"),
            vec!["counter.py", "counter"]
        );
    }

    #[test]
    fn test_target_keywords_descriptors() {
        assert_eq!(
            target_keywords("stop the infinite counter process"),
            vec!["infinite_counter", "counter", "infinite"]
        );
        assert_eq!(target_keywords("kill the runaway process"), vec!["counter", "infinite"]);
    }

    #[test]
    fn test_named_files() {
        assert_eq!(
            named_files("delete old.txt and ~/logs/run.log, keep old.txt"),
            vec!["old.txt", "~/logs/run.log"]
        );
        assert!(named_files("delete everything").is_empty());
    }

    #[test]
    fn test_output_file() {
        assert_eq!(
            output_file("kill the counter that writes counter_log.txt").as_deref(),
            Some("counter_log.txt")
        );
        assert_eq!(output_file("kill the counter"), None);
    }
}
