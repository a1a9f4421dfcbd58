//! Execution results.

use serde::{Deserialize, Serialize};

use super::target::Target;

/// How an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Exited with code 0
    Success,
    /// Killed at the timeout after producing stdout or file changes
    ProductiveTimeout,
    /// Killed at the timeout with nothing to show for it
    Timeout,
    /// Exited non-zero
    Crash,
    /// Compiler rejected the source; the program never ran
    CompileFailed,
    /// Header file; nothing to execute on its own
    Skipped,
    /// No runner for this language on its target; counts as a failure
    Unrunnable,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::ProductiveTimeout => "productive_timeout",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::Crash => "crash",
            ExecutionStatus::CompileFailed => "compile_failed",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::Unrunnable => "unrunnable",
        }
    }

    /// Whether this status counts as a passing execution.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::ProductiveTimeout | ExecutionStatus::Skipped
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of running one kept block once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Filename (or the command line for direct commands)
    pub name: String,
    pub target: Target,
    pub status: ExecutionStatus,
    /// Exit code; `None` when the process was killed or never started
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
    /// Files created or modified in the work dir during the run
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl ExecutionResult {
    pub fn new(name: impl Into<String>, target: Target, status: ExecutionStatus) -> Self {
        Self {
            name: name.into(),
            target,
            status,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            elapsed_ms: 0,
            files_changed: Vec::new(),
            note: None,
        }
    }

    /// A result for a header file that has nothing to run.
    pub fn skipped(name: impl Into<String>, target: Target, note: impl Into<String>) -> Self {
        Self::new(name, target, ExecutionStatus::Skipped).with_note(note)
    }

    /// A failing result for a file no runner exists for.
    pub fn unrunnable(name: impl Into<String>, target: Target, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let mut result = Self::new(name, target, ExecutionStatus::Unrunnable);
        result.stderr = reason.clone();
        result.with_note(reason)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn timed_out(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Timeout | ExecutionStatus::ProductiveTimeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_success_set() {
        assert!(ExecutionStatus::Success.is_success());
        assert!(ExecutionStatus::ProductiveTimeout.is_success());
        assert!(ExecutionStatus::Skipped.is_success());
        assert!(!ExecutionStatus::Timeout.is_success());
        assert!(!ExecutionStatus::Crash.is_success());
        assert!(!ExecutionStatus::CompileFailed.is_success());
        assert!(!ExecutionStatus::Unrunnable.is_success());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ExecutionStatus::ProductiveTimeout).unwrap();
        assert_eq!(json, "\"productive_timeout\"");
    }

    #[test]
    fn test_skipped_result() {
        let result = ExecutionResult::skipped("config.h", Target::Local, "header file");
        assert!(result.is_success());
        assert_eq!(result.note.as_deref(), Some("header file"));
        assert!(result.exit_code.is_none());
    }

    #[test]
    fn test_unrunnable_result_fails_with_reason() {
        let result = ExecutionResult::unrunnable("app.ts", Target::Local, "no runner for 'typescript' files");
        assert!(!result.is_success());
        assert_eq!(result.status.as_str(), "unrunnable");
        assert_eq!(result.stderr, "no runner for 'typescript' files");
    }

    #[test]
    fn test_timed_out() {
        let productive = ExecutionResult::new("a.py", Target::Local, ExecutionStatus::ProductiveTimeout);
        let crash = ExecutionResult::new("a.py", Target::Local, ExecutionStatus::Crash);
        assert!(productive.timed_out());
        assert!(!crash.timed_out());
    }
}
