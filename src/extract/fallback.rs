//! Recovery for responses that lost their fences.
//!
//! Text scraped through `innerText` drops the ``` markers but keeps the
//! language label the UI renders above each block. When even that is gone,
//! the longest run of code-looking lines is taken.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::RawBlock;
use crate::domain::block::normalize_language;

/// Labels the chat UI prints above a code block.
const KNOWN_LANGUAGES: &[&str] = &[
    "python", "bash", "c", "cpp", "c++", "javascript", "typescript", "rust", "java", "sh",
    "cmake", "makefile", "json", "yaml", "yml", "html", "css", "xml", "sql", "go", "ruby",
    "perl", "swift", "kotlin", "scala", "r", "matlab", "lua", "zig", "toml", "ini",
    "dockerfile", "plaintext", "text", "txt", "assembly", "asm", "verilog", "vhdl",
];

/// Prose that follows a block and ends it.
const TRAILING_PHRASES: &[&str] = &["Run it:", "If you want", "Just say", "Want to", "Tell me"];

static NUMBERED_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+\.\s+[A-Z]|[0-9]+\x{FE0F}?\x{20E3})").expect("constant regex pattern is valid")
});

static CODE_STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:if|elif|else|for|while|try|except|with|return|yield|raise|pass|break|continue)\b|\w+\s*=|\w+\s*[-+*/]=|\w+\.\w+\(|\w+\s*\(|#\s)",
    )
    .expect("constant regex pattern is valid")
});

static PROSE_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:Here |This version|The previous|It |To avoid|I |You |Note:|Now |If you |Run |Save |Usage|Why |So |Your )",
    )
    .expect("constant regex pattern is valid")
});

static SENTENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][a-z]+ [a-z]+ [a-z]+ [a-z]+").expect("constant regex pattern is valid")
});

const CODE_PREFIXES: &[&str] = &[
    "def ", "class ", "import ", "from ", "if __name__", "#!/", "#include", "int main", "void ",
    "fn ",
];

/// Blank lines tolerated inside a scored code run.
const MAX_BLANK_STREAK: usize = 3;

fn is_language_header(line: &str) -> bool {
    KNOWN_LANGUAGES.contains(&line.trim_end())
}

fn ends_loose_block(line: &str) -> bool {
    is_language_header(line)
        || NUMBERED_HEADING.is_match(line)
        || TRAILING_PHRASES.iter().any(|p| line.starts_with(p))
}

/// Lines with their byte offsets.
fn lines_with_offsets(text: &str) -> Vec<(usize, &str)> {
    let mut offset = 0;
    text.split('\n')
        .map(|line| {
            let start = offset;
            offset += line.len() + 1;
            (start, line)
        })
        .collect()
}

/// Blocks introduced by a bare language label line.
pub fn extract_loose(text: &str) -> Vec<RawBlock> {
    let lines = lines_with_offsets(text);
    let mut seen = HashSet::new();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let (offset, line) = lines[i];
        if !is_language_header(line) {
            i += 1;
            continue;
        }

        let language = line.trim_end();
        let mut j = i + 1;
        if lines
            .get(j)
            .is_some_and(|(_, l)| l.trim().eq_ignore_ascii_case("copy code"))
        {
            j += 1;
        }

        let body_start = j;
        while j < lines.len() && !ends_loose_block(lines[j].1) {
            j += 1;
        }

        let code = lines[body_start..j]
            .iter()
            .map(|(_, l)| *l)
            .collect::<Vec<_>>()
            .join("\n");
        let code = code.trim();
        if !code.is_empty() && seen.insert(code.to_string()) {
            blocks.push(RawBlock {
                language: normalize_language(language),
                code: code.to_string(),
                offset,
            });
        }
        i = j.max(i + 1);
    }

    blocks
}

fn looks_like_code(line: &str) -> bool {
    let stripped = line.trim();
    if stripped.is_empty() {
        return true;
    }
    CODE_PREFIXES.iter().any(|p| stripped.starts_with(p))
        || ((line.starts_with("    ") || line.starts_with('\t')) && stripped.len() > 1)
        || CODE_STATEMENT.is_match(stripped)
}

fn looks_like_prose(line: &str) -> bool {
    let stripped = line.trim();
    if PROSE_OPENER.is_match(stripped) {
        return true;
    }
    if SENTENCE.is_match(stripped)
        && !["import ", "from ", "class ", "def "]
            .iter()
            .any(|kw| stripped.contains(kw))
    {
        return true;
    }
    stripped.starts_with("- ") || stripped.starts_with("* ") || stripped.starts_with("> ")
}

/// Best-effort language guess for an unlabeled block.
pub fn guess_language(code: &str) -> &'static str {
    if code.contains("def ") || code.contains("import ") || code.contains("print(") {
        "python"
    } else if code.contains("#include") || code.contains("int main") {
        "c"
    } else if code.starts_with("#!/bin/bash") || code.starts_with("#!/bin/sh") {
        "bash"
    } else {
        "txt"
    }
}

fn keep_longer(start: usize, end: usize, best: &mut (usize, usize)) {
    if end > start && end - start > best.1 - best.0 {
        *best = (start, end);
    }
}

/// Longest contiguous run of code-looking lines.
///
/// Returns nothing unless the run spans at least `min_lines` lines and more
/// than `min_chars` characters.
pub fn extract_scored(text: &str, min_lines: usize, min_chars: usize) -> Option<RawBlock> {
    let lines = lines_with_offsets(text);
    let is_code: Vec<bool> = lines
        .iter()
        .map(|(_, l)| !looks_like_prose(l) && looks_like_code(l))
        .collect();

    let mut best: (usize, usize) = (0, 0);
    let mut run_start: Option<usize> = None;
    let mut blank_streak = 0;

    for (i, (_, line)) in lines.iter().enumerate() {
        if !is_code[i] {
            if let Some(start) = run_start.take() {
                keep_longer(start, i - blank_streak, &mut best);
            }
            blank_streak = 0;
            continue;
        }
        if line.trim().is_empty() {
            if run_start.is_some() {
                blank_streak += 1;
                if blank_streak > MAX_BLANK_STREAK {
                    if let Some(start) = run_start.take() {
                        keep_longer(start, i + 1 - blank_streak, &mut best);
                    }
                    blank_streak = 0;
                }
            }
        } else {
            blank_streak = 0;
            if run_start.is_none() {
                run_start = Some(i);
            }
        }
    }
    if let Some(start) = run_start {
        keep_longer(start, lines.len() - blank_streak, &mut best);
    }

    let (start, end) = best;
    if end - start < min_lines {
        return None;
    }
    let code = lines[start..end]
        .iter()
        .map(|(_, l)| *l)
        .collect::<Vec<_>>()
        .join("\n");
    let code = code.trim();
    if code.chars().count() <= min_chars {
        return None;
    }
    Some(RawBlock {
        language: guess_language(code).to_string(),
        code: code.to_string(),
        offset: lines[start].0,
    })
}
