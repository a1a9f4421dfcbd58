//! Code extraction from chat responses.
//!
//! Order of attempts:
//! 1. Fenced regions
//! 2. Bare language-label headers (fences lost in copy)
//! 3. Longest run of code-looking lines
//!
//! Every recovered region then passes through the direct-command check and
//! the junk rules before it is named and kept.

pub mod fallback;
pub mod fenced;
pub mod hints;
pub mod junk;

use serde::{Deserialize, Serialize};

use crate::domain::block::{extension_for, preview};
use crate::domain::{BlockKind, CodeBlock, FilenameOrigin};

pub use hints::{FilenameAllocator, ResponseHints, prompt_slug};
pub use junk::{Candidate, JunkRule, SHORT_BLOCK_RULES};

/// A recovered region before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBlock {
    pub language: String,
    pub code: String,
    pub offset: usize,
}

/// Thresholds for extraction heuristics.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExtractionSettings {
    /// Blocks longer than this are never junk (except non-program languages)
    pub max_junk_lines: usize,
    /// Minimum lines for a line-scored fallback block
    pub min_fallback_lines: usize,
    /// A line-scored fallback block must be longer than this
    pub min_fallback_chars: usize,
    pub min_timeout_secs: u64,
    pub max_timeout_secs: u64,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            max_junk_lines: 5,
            min_fallback_lines: 3,
            min_fallback_chars: 20,
            min_timeout_secs: 5,
            max_timeout_secs: 600,
        }
    }
}

/// Which pass produced the blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    Fenced,
    LooseHeaders,
    LineScoring,
    Nothing,
}

/// A discarded region and the rule that discarded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JunkBlock {
    pub rule: String,
    pub block: RawBlock,
}

impl JunkBlock {
    pub fn preview(&self, max_chars: usize) -> String {
        preview(&self.block.code, max_chars)
    }
}

/// Everything recovered from one response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub source: ExtractionSource,
    pub blocks: Vec<CodeBlock>,
    pub junk: Vec<JunkBlock>,
    pub hints: ResponseHints,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn programs(&self) -> impl Iterator<Item = &CodeBlock> {
        self.blocks.iter().filter(|b| b.kind == BlockKind::Program)
    }

    pub fn commands(&self) -> impl Iterator<Item = &CodeBlock> {
        self.blocks.iter().filter(|b| b.kind == BlockKind::DirectCommand)
    }
}

enum Verdict {
    Program(RawBlock),
    Command(RawBlock, Vec<String>),
    Junk(&'static str, RawBlock),
}

/// Turns response text into kept code blocks.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    settings: ExtractionSettings,
}

impl Extractor {
    pub fn new(settings: ExtractionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExtractionSettings {
        &self.settings
    }

    /// Recover regions without classifying them.
    pub fn recover(&self, text: &str) -> (ExtractionSource, Vec<RawBlock>) {
        let blocks = fenced::extract_fenced(text);
        if !blocks.is_empty() {
            return (ExtractionSource::Fenced, blocks);
        }
        let blocks = fallback::extract_loose(text);
        if !blocks.is_empty() {
            log::debug!("No fences found, recovered {} block(s) from language headers", blocks.len());
            return (ExtractionSource::LooseHeaders, blocks);
        }
        match fallback::extract_scored(
            text,
            self.settings.min_fallback_lines,
            self.settings.min_fallback_chars,
        ) {
            Some(block) => {
                log::debug!("Recovered a {} block by line scoring", block.language);
                (ExtractionSource::LineScoring, vec![block])
            }
            None => (ExtractionSource::Nothing, Vec::new()),
        }
    }

    fn judge(&self, raw: RawBlock) -> Verdict {
        let candidate = Candidate::new(&raw);
        if let Some(commands) = junk::direct_commands(&candidate, self.settings.max_junk_lines) {
            return Verdict::Command(raw, commands);
        }
        match junk::junk_reason(&candidate, self.settings.max_junk_lines) {
            Some(rule) => Verdict::Junk(rule, raw),
            None => Verdict::Program(raw),
        }
    }

    /// Extract, filter, and name the blocks of a response.
    ///
    /// `prompt` is the operator's task text, used to name files when the
    /// response offers no filename hints.
    pub fn extract(&self, text: &str, prompt: &str) -> Extraction {
        let (source, raw_blocks) = self.recover(text);
        let hints = ResponseHints::parse(
            text,
            self.settings.min_timeout_secs,
            self.settings.max_timeout_secs,
        );

        let mut programs = Vec::new();
        let mut commands = Vec::new();
        let mut junk = Vec::new();
        for raw in raw_blocks {
            match self.judge(raw) {
                Verdict::Program(raw) => programs.push(raw),
                Verdict::Command(raw, lines) => commands.push((raw, lines)),
                Verdict::Junk(rule, raw) => {
                    log::debug!("Dropping {} block as {}: {}", raw.language, rule, preview(&raw.code, 60));
                    junk.push(JunkBlock {
                        rule: rule.to_string(),
                        block: raw,
                    });
                }
            }
        }

        if programs.is_empty() && commands.is_empty() && !junk.is_empty() {
            let largest = junk
                .iter()
                .enumerate()
                .max_by_key(|(i, j)| (j.block.code.len(), std::cmp::Reverse(*i)))
                .map(|(i, _)| i);
            if let Some(index) = largest {
                let kept = junk.remove(index);
                log::info!(
                    "Every block looked like junk; keeping the largest ({} chars, rule {})",
                    kept.block.code.len(),
                    kept.rule
                );
                programs.push(kept.block);
            }
        }

        let mut allocator = FilenameAllocator::new(hints.filenames.clone(), prompt, programs.len());
        let mut blocks: Vec<CodeBlock> = programs
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                let (filename, origin) = allocator.allocate(extension_for(&raw.language), index);
                CodeBlock {
                    language: raw.language,
                    code: raw.code,
                    filename,
                    origin,
                    offset: raw.offset,
                    kind: BlockKind::Program,
                }
            })
            .collect();

        blocks.extend(commands.into_iter().enumerate().map(|(index, (raw, lines))| CodeBlock {
            language: "bash".to_string(),
            code: lines.join("\n"),
            filename: format!("command_{}", index + 1),
            origin: FilenameOrigin::Generated,
            offset: raw.offset,
            kind: BlockKind::DirectCommand,
        }));
        blocks.sort_by_key(|b| b.offset);

        Extraction {
            source,
            blocks,
            junk,
            hints,
        }
    }
}
