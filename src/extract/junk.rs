//! Junk-block rules.
//!
//! Chat answers surround the real program with throwaway fragments: the
//! command that runs it, sample terminal output, install tips. Each rule
//! here recognizes one kind of fragment. Rules are checked in order and the
//! first match names the reason a block was dropped.

use regex::Regex;
use std::sync::LazyLock;

use super::RawBlock;
use crate::domain::block::{content_lines, is_shell_language};

/// Languages that never hold a runnable program.
const NON_PROGRAM_LANGUAGES: &[&str] = &["txt", "text", "plaintext", "yaml", "yml"];

/// Keywords whose presence means a short snippet carries real logic.
const LOGIC_KEYWORDS: &[&str] = &[
    "def ", "class ", "import ", "from ", "for ", "while ", "if ", "#include", "int main",
    "void ", "fn ",
];

static RUN_PREVIOUS_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:python3?\s+\S+\.py|node\s+\S+\.js|gcc\s+|g\+\+\s+|make\b|bash\s+\S+\.sh|cd\s+.*&&\s*(?:python|node|gcc|make|bash|\./)|\./\w+)",
    )
    .expect("constant regex pattern is valid")
});

static BACKGROUND_LAUNCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)python3?\s+\S+\.py\s*&|nohup\s+|\bfg\b.*ctrl")
        .expect("constant regex pattern is valid")
});

static EXAMPLE_OUTPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\$\s+|^\s*\d+\s+\d+\.\d+\s+|^\w+\s+\d+\s+\d+\.\d+\s+\d+\.\d+\s+|kill\s+(?:-\d+\s+)?(?:\d{4,5}\b|<PID>)|^ps\s+aux\s*\|",
    )
    .expect("constant regex pattern is valid")
});

static SETUP_INSTRUCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^(?:pip3?\s+install|chmod\s+|sudo\s+(?:reboot|shutdown|halt))")
        .expect("constant regex pattern is valid")
});

static DIRECT_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:pkill\s+(?:-\w+\s+)*-f\s+\S+|pkill\s+(?:-\d+\s+)?\w+|killall\s+\S+|systemctl\s+(?:stop|kill)\s+\S+|service\s+\S+\s+stop)",
    )
    .expect("constant regex pattern is valid")
});

/// What a rule looks at.
pub struct Candidate<'a> {
    pub language: &'a str,
    pub code: &'a str,
    /// Non-blank lines
    pub lines: Vec<&'a str>,
}

impl<'a> Candidate<'a> {
    pub fn new(block: &'a RawBlock) -> Self {
        Self {
            language: &block.language,
            code: &block.code,
            lines: content_lines(&block.code),
        }
    }

    fn joined(&self) -> String {
        self.lines.iter().map(|l| l.trim()).collect::<Vec<_>>().join(" ")
    }
}

/// A named junk predicate.
pub struct JunkRule {
    pub name: &'static str,
    matches: fn(&Candidate<'_>) -> bool,
}

impl JunkRule {
    pub fn matches(&self, candidate: &Candidate<'_>) -> bool {
        (self.matches)(candidate)
    }
}

// Run lines, launch tips, and setup steps are shell text; a short program
// in another language may legitimately start with `make` or `./`.
fn run_previous_script(c: &Candidate<'_>) -> bool {
    is_shell_language(c.language) && RUN_PREVIOUS_SCRIPT.is_match(&c.joined())
}

fn background_launch(c: &Candidate<'_>) -> bool {
    is_shell_language(c.language) && BACKGROUND_LAUNCH.is_match(c.code)
}

fn example_output(c: &Candidate<'_>) -> bool {
    EXAMPLE_OUTPUT.is_match(c.code)
}

fn setup_instruction(c: &Candidate<'_>) -> bool {
    is_shell_language(c.language) && c.lines.iter().any(|l| SETUP_INSTRUCTION.is_match(l.trim()))
}

fn logic_free_snippet(c: &Candidate<'_>) -> bool {
    c.lines.len() <= 2
        && !matches!(c.language, "c" | "cpp")
        && !LOGIC_KEYWORDS.iter().any(|kw| c.code.contains(kw))
}

/// Heuristic rules, only applied to short blocks.
pub const SHORT_BLOCK_RULES: &[JunkRule] = &[
    JunkRule {
        name: "run_previous_script",
        matches: run_previous_script,
    },
    JunkRule {
        name: "background_launch",
        matches: background_launch,
    },
    JunkRule {
        name: "example_output",
        matches: example_output,
    },
    JunkRule {
        name: "setup_instruction",
        matches: setup_instruction,
    },
    JunkRule {
        name: "logic_free_snippet",
        matches: logic_free_snippet,
    },
];

/// Name of the rule that marks this block as junk, if any.
pub fn junk_reason(candidate: &Candidate<'_>, max_junk_lines: usize) -> Option<&'static str> {
    if NON_PROGRAM_LANGUAGES.contains(&candidate.language) {
        return Some("non_program_language");
    }
    if candidate.lines.len() > max_junk_lines {
        return None;
    }
    SHORT_BLOCK_RULES
        .iter()
        .find(|rule| rule.matches(candidate))
        .map(|rule| rule.name)
}

/// The actionable shell lines of a block, if it is a direct command.
///
/// A direct command is a short shell block where every non-comment line is
/// a stop/kill one-liner (`pkill -f x`, `killall x`, `systemctl stop x`).
/// A leading `sudo` is allowed and kept.
pub fn direct_commands(candidate: &Candidate<'_>, max_junk_lines: usize) -> Option<Vec<String>> {
    if !is_shell_language(candidate.language) || candidate.lines.len() > max_junk_lines {
        return None;
    }
    let commands: Vec<String> = candidate
        .lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.starts_with('#'))
        .map(String::from)
        .collect();
    let actionable = |c: &String| {
        let command = c.strip_prefix("sudo ").unwrap_or(c.as_str());
        DIRECT_COMMAND.is_match(command.trim_start())
    };
    if commands.is_empty() || !commands.iter().all(actionable) {
        return None;
    }
    Some(commands)
}
