//! Per-run transcript files.
//!
//! Each run gets `<run-id>.md`, appended to as attempts finish, and
//! `<run-id>.json`, the complete run record written once the run ends.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::{Attempt, RunRecord};
use crate::error::Result;

const PREVIEW_CHARS: usize = 80;

/// Append-only markdown log of one run.
#[derive(Debug, Clone)]
pub struct Transcript {
    markdown: PathBuf,
    json: PathBuf,
}

impl Transcript {
    /// Create the transcript files for `record` under `dir` and write the header.
    pub fn create(dir: impl AsRef<Path>, record: &RunRecord) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let transcript = Self {
            markdown: dir.join(format!("{}.md", record.id)),
            json: dir.join(format!("{}.json", record.id)),
        };
        transcript.append(&render_header(record))?;
        log::debug!("Transcript for {} at {}", record.id, transcript.markdown.display());
        Ok(transcript)
    }

    pub fn markdown_path(&self) -> &Path {
        &self.markdown
    }

    pub fn json_path(&self) -> &Path {
        &self.json
    }

    fn append(&self, text: &str) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.markdown)?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }

    pub fn record_attempt(&self, attempt: &Attempt) -> Result<()> {
        self.append(&render_attempt(attempt))
    }

    /// Write the final status and the JSON run record.
    pub fn record_final(&self, record: &RunRecord) -> Result<()> {
        self.append(&render_final(record))?;
        fs::write(&self.json, serde_json::to_string_pretty(record)?)?;
        Ok(())
    }
}

/// A fence long enough to hold text that itself contains fences.
fn fenced(lang: &str, body: &str) -> String {
    let mut fence = "```".to_string();
    while body.contains(fence.as_str()) {
        fence.push('`');
    }
    format!("{fence}{lang}\n{}\n{fence}\n", body.trim_end())
}

pub fn render_header(record: &RunRecord) -> String {
    let mut out = format!("# Run {}\n\n", record.id);
    out.push_str(&format!("- Started: {}\n", record.started_at.format("%Y-%m-%d %H:%M:%S")));
    if let Some(target) = record.target {
        out.push_str(&format!("- Target: {} ({})\n", target, target.describe()));
    }
    out.push_str(&format!("- Max attempts: {}\n\n", record.max_retries));
    out.push_str("## Task\n\n");
    out.push_str(&fenced("text", &record.prompt));
    out.push('\n');
    out
}

pub fn render_attempt(attempt: &Attempt) -> String {
    let mut out = format!("## Attempt {}\n\n### Prompt\n\n", attempt.number);
    out.push_str(&fenced("text", &attempt.prompt));
    out.push_str("\n### Response\n\n");
    out.push_str(&fenced("markdown", &attempt.response));

    if !attempt.blocks.is_empty() {
        out.push_str("\n### Extracted\n\n");
        for block in &attempt.blocks {
            let placement = attempt.placements.iter().find(|p| p.filename == block.filename);
            match placement {
                Some(p) => out.push_str(&format!(
                    "- `{}` ({}) -> {} [{}]\n",
                    block.filename, block.language, p.target, p.rule
                )),
                None => out.push_str(&format!("- `{}` ({})\n", block.filename, block.language)),
            }
        }
    }
    if !attempt.junk.is_empty() {
        out.push_str("\n### Discarded\n\n");
        for (rule, preview) in &attempt.junk {
            let preview: String = preview.chars().take(PREVIEW_CHARS).collect();
            out.push_str(&format!("- {}: `{}`\n", rule, preview.replace('`', "'")));
        }
    }

    for result in &attempt.results {
        out.push_str(&format!(
            "\n### Execution: {} on {}\n\n- Status: {}\n",
            result.name, result.target, result.status
        ));
        match result.exit_code {
            Some(code) => out.push_str(&format!("- Exit code: {}\n", code)),
            None => out.push_str("- Exit code: none\n"),
        }
        out.push_str(&format!("- Elapsed: {} ms\n", result.elapsed_ms));
        if !result.files_changed.is_empty() {
            out.push_str(&format!("- Files changed: {}\n", result.files_changed.join(", ")));
        }
        if let Some(note) = &result.note {
            out.push_str(&format!("- Note: {}\n", note));
        }
        if !result.stdout.trim().is_empty() {
            out.push_str("\nstdout:\n\n");
            out.push_str(&fenced("text", &result.stdout));
        }
        if !result.stderr.trim().is_empty() {
            out.push_str("\nstderr:\n\n");
            out.push_str(&fenced("text", &result.stderr));
        }
    }

    if !attempt.acceptance.is_empty() {
        out.push_str("\n### Acceptance\n\n");
        for report in &attempt.acceptance {
            let verdict = if report.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!("- {} {}: {}\n", verdict, report.name, report.reason));
            for (key, value) in &report.evidence {
                out.push_str(&format!("  - {}: {}\n", key, value));
            }
        }
    }

    if let Some(failure) = attempt.failure {
        out.push_str(&format!("\n**Failure:** {}\n", failure));
    }
    if let Some(error) = &attempt.error {
        out.push_str(&format!("\n**Error:** {}\n", error));
    }
    if let Some(feedback) = &attempt.feedback {
        out.push_str("\n### Feedback\n\n");
        out.push_str(&fenced("text", feedback));
    }
    out.push('\n');
    out
}

pub fn render_final(record: &RunRecord) -> String {
    let mut out = format!("## Result: {}\n\n", record.status);
    out.push_str(&format!("- Attempts: {} of {}\n", record.attempt_count(), record.max_retries));
    if let Some(failure) = record.last_failure() {
        out.push_str(&format!("- Last failure: {}\n", failure));
    }
    if let Some(finished) = record.finished_at {
        out.push_str(&format!("- Finished: {}\n", finished.format("%Y-%m-%d %H:%M:%S")));
    }
    out
}
