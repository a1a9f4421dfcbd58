//! Feedback text sent back into the conversation after a failed attempt.
//!
//! Feedback is typed into the chat input, where markdown gets mangled, so
//! everything here is plain text: no fences, no headings, no bold. The
//! conversation already contains the code, so only the evidence is sent.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{AcceptanceReport, ExecutionResult, ExecutionStatus};

static MISSING_MODULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"No module named '([\w.]+)'").expect("constant regex pattern is valid"));

/// Formats execution and acceptance failures for the next prompt.
#[derive(Debug, Clone)]
pub struct FeedbackFormatter {
    /// Characters of stderr kept per failed result
    pub max_stderr_chars: usize,
    /// Characters of stdout kept per failed result
    pub max_stdout_chars: usize,
}

impl Default for FeedbackFormatter {
    fn default() -> Self {
        Self {
            max_stderr_chars: 2000,
            max_stdout_chars: 500,
        }
    }
}

impl FeedbackFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feedback for an attempt where at least one block failed to compile or run.
    pub fn format_execution(&self, results: &[ExecutionResult]) -> String {
        let mut lines = vec![
            "The code you just gave me has errors. Here are the execution results:".to_string(),
            String::new(),
        ];

        for result in results {
            match result.status {
                ExecutionStatus::Skipped => {
                    let note = result.note.as_deref().unwrap_or("not executed");
                    lines.push(format!("{}: skipped ({})", result.name, note));
                    continue;
                }
                ExecutionStatus::Success => {
                    lines.push(format!("{}: OK, ran successfully", result.name));
                    continue;
                }
                ExecutionStatus::ProductiveTimeout => {
                    lines.push(format!(
                        "{}: OK, produced output before timeout (long-running program)",
                        result.name
                    ));
                    continue;
                }
                _ => {}
            }

            lines.push(format!("--- {} FAILED ---", result.name));
            match result.status {
                ExecutionStatus::CompileFailed => lines.push("Compilation failed.".to_string()),
                ExecutionStatus::Unrunnable => {
                    lines.push("This file could not be executed, nothing ran.".to_string());
                }
                ExecutionStatus::Timeout => lines.push(format!(
                    "Timed out after {}s with no output and no file changes.",
                    result.elapsed_ms / 1000
                )),
                _ => {}
            }
            if let Some(code) = result.exit_code {
                lines.push(format!("Exit code: {}", code));
            }
            let stderr = result.stderr.trim();
            if !stderr.is_empty() {
                lines.push("STDERR:".to_string());
                lines.push(truncate_chars(stderr, self.max_stderr_chars).to_string());
            }
            let stdout = result.stdout.trim();
            if !stdout.is_empty() {
                lines.push("STDOUT:".to_string());
                lines.push(truncate_chars(stdout, self.max_stdout_chars).to_string());
            }
            let missing = missing_modules(&result.stderr);
            if !missing.is_empty() {
                lines.push(format!("Missing modules: {}", missing.join(", ")));
            }
            lines.push(String::new());
        }

        if !results.is_empty() && results.iter().all(|r| r.status == ExecutionStatus::Skipped) {
            lines.push("Nothing was executed. Include the complete runnable program, not only headers.".to_string());
            lines.push(String::new());
        }

        lines.extend(
            [
                "IMPORTANT: Do not use any third-party libraries unless absolutely necessary.",
                "If you must use external packages, list them at the top of your response",
                "in this exact format: DEPENDENCIES: package1, package2, package3",
                "If no external packages are needed, do NOT include a DEPENDENCIES line at all.",
                "",
                "Please fix the code. Return the complete corrected version, not just the changes.",
            ]
            .map(String::from),
        );
        lines.join("\n")
    }

    /// Feedback for an attempt that ran cleanly but failed acceptance.
    ///
    /// Empty when every report passed.
    pub fn format_acceptance(&self, reports: &[AcceptanceReport]) -> String {
        let failures: Vec<&AcceptanceReport> = reports.iter().filter(|r| !r.passed).collect();
        if failures.is_empty() {
            return String::new();
        }

        let mut lines = vec![
            "The code ran without errors (exit code 0), but FAILED the acceptance tests.".to_string(),
            format!("{} of {} test(s) failed:", failures.len(), reports.len()),
            String::new(),
        ];
        for failure in failures {
            lines.push(format!("FAILED TEST: {}", failure.name));
            lines.push(format!("  Reason: {}", failure.reason));
            for (key, value) in &failure.evidence {
                lines.push(format!("  {}: {}", key, value));
            }
            lines.push(String::new());
        }
        lines.push("IMPORTANT: The above tests define success. Your code must make ALL tests pass.".to_string());
        lines.push("Do NOT delete files or take unrelated actions -- solve the actual problem.".to_string());
        lines.push("Please return the complete corrected version, not just the changes.".to_string());
        lines.join("\n")
    }
}

/// Python modules reported missing in `stderr`, in order, deduplicated.
pub fn missing_modules(stderr: &str) -> Vec<String> {
    let mut modules: Vec<String> = Vec::new();
    for caps in MISSING_MODULE.captures_iter(stderr) {
        let name = caps[1].to_string();
        if !modules.contains(&name) {
            modules.push(name);
        }
    }
    modules
}

/// At most `max` characters of `text`, cut on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Target;

    fn crashed(name: &str, stderr: &str) -> ExecutionResult {
        let mut result = ExecutionResult::new(name, Target::Local, ExecutionStatus::Crash);
        result.exit_code = Some(1);
        result.stderr = stderr.to_string();
        result
    }

    #[test]
    fn test_execution_feedback_lists_failures_and_successes() {
        let results = vec![
            ExecutionResult::new("helper.py", Target::Local, ExecutionStatus::Success),
            crashed(
                "main.py",
                "Traceback (most recent call last):\nModuleNotFoundError: No module named 'numpy'",
            ),
        ];
        let text = FeedbackFormatter::new().format_execution(&results);

        assert!(text.starts_with("The code you just gave me has errors."));
        assert!(text.contains("helper.py: OK, ran successfully"));
        assert!(text.contains("--- main.py FAILED ---\nExit code: 1\nSTDERR:\nTraceback"));
        assert!(text.contains("Missing modules: numpy"));
        assert!(text.ends_with("Return the complete corrected version, not just the changes."));
    }

    #[test]
    fn test_execution_feedback_has_no_markdown() {
        let text = FeedbackFormatter::new().format_execution(&[crashed("a.py", "boom")]);
        assert!(!text.contains("```"));
        assert!(!text.contains("**"));
        assert!(!text.lines().any(|l| l.starts_with('#')));
    }

    #[test]
    fn test_stderr_truncated_on_char_boundary() {
        let formatter = FeedbackFormatter {
            max_stderr_chars: 3,
            max_stdout_chars: 500,
        };
        let text = formatter.format_execution(&[crashed("a.py", "ééééé")]);
        assert!(text.contains("STDERR:\nééé\n"));
        assert!(!text.contains("éééé"));
    }

    #[test]
    fn test_only_headers_asks_for_program() {
        let results = vec![ExecutionResult::skipped("defs.h", Target::Local, "header file")];
        let text = FeedbackFormatter::new().format_execution(&results);
        assert!(text.contains("defs.h: skipped (header file)"));
        assert!(text.contains("Nothing was executed."));
    }

    #[test]
    fn test_unrunnable_reported_as_failure() {
        let results = vec![ExecutionResult::unrunnable(
            "fizzbuzz.ts",
            Target::Local,
            "no runner for 'typescript' files",
        )];
        let text = FeedbackFormatter::new().format_execution(&results);
        assert!(text.contains("--- fizzbuzz.ts FAILED ---\nThis file could not be executed, nothing ran."));
        assert!(text.contains("STDERR:\nno runner for 'typescript' files"));
        assert!(!text.contains("Nothing was executed."));
    }

    #[test]
    fn test_acceptance_feedback() {
        let reports = vec![
            AcceptanceReport::pass("file_stable", "not growing"),
            AcceptanceReport::fail("processes_killed", "1 target process(es) still running")
                .with_evidence("post_surviving", "4242"),
        ];
        let text = FeedbackFormatter::new().format_acceptance(&reports);
        assert!(text.starts_with("The code ran without errors (exit code 0), but FAILED the acceptance tests."));
        assert!(text.contains("1 of 2 test(s) failed:"));
        assert!(text.contains("FAILED TEST: processes_killed\n  Reason: 1 target process(es) still running\n  post_surviving: 4242"));
        assert!(!text.contains("FAILED TEST: file_stable"));
    }

    #[test]
    fn test_acceptance_feedback_empty_when_all_pass() {
        let reports = vec![AcceptanceReport::pass("file_created", "new file appeared")];
        assert!(FeedbackFormatter::new().format_acceptance(&reports).is_empty());
    }

    #[test]
    fn test_missing_modules_deduplicated() {
        let stderr = "No module named 'serial'\nNo module named 'serial'\nNo module named 'smbus2'";
        assert_eq!(missing_modules(stderr), vec!["serial", "smbus2"]);
    }
}
