//! Run records.
//!
//! A `RunRecord` is the append-only history of one task: every prompt sent,
//! every response received, and what happened when the extracted code ran.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::block::CodeBlock;
use super::execution::ExecutionResult;
use super::outcome::{AcceptanceReport, FailureCategory};
use super::target::Target;
use crate::error::{Result, VerifyError};
use crate::id::generate_run_id;

/// Run status state machine: Running -> Succeeded | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where one kept block was sent and which rule decided it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub filename: String,
    pub target: Target,
    pub rule: String,
}

/// One prompt/response/execute/check cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based
    pub number: u32,
    pub prompt: String,
    pub response: String,
    pub blocks: Vec<CodeBlock>,
    /// `(rule, preview)` for every discarded block
    pub junk: Vec<(String, String)>,
    pub placements: Vec<Placement>,
    pub results: Vec<ExecutionResult>,
    pub acceptance: Vec<AcceptanceReport>,
    pub failure: Option<FailureCategory>,
    /// Follow-up text sent after this attempt failed
    pub feedback: Option<String>,
    /// Chat or transport error that ended the run during this attempt
    #[serde(default)]
    pub error: Option<String>,
}

impl Attempt {
    /// Whether every execution and acceptance check passed.
    pub fn passed(&self) -> bool {
        self.failure.is_none()
            && self.results.iter().all(|r| r.is_success())
            && self.acceptance.iter().all(|a| a.passed)
    }
}

/// Full history of one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub prompt: String,
    pub target: Option<Target>,
    pub max_retries: u32,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub attempts: Vec<Attempt>,
    pub status: RunStatus,
}

impl RunRecord {
    pub fn new(prompt: impl Into<String>, max_retries: u32) -> Self {
        let prompt = prompt.into();
        Self {
            id: generate_run_id(&prompt),
            prompt,
            target: None,
            max_retries,
            started_at: Local::now(),
            finished_at: None,
            attempts: Vec::new(),
            status: RunStatus::Running,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Whether another attempt may be started.
    pub fn can_retry(&self) -> bool {
        self.status == RunStatus::Running && self.attempt_count() < self.max_retries
    }

    /// Open a new attempt for the given outgoing prompt text.
    pub fn begin_attempt(&mut self, prompt: impl Into<String>) -> Result<&mut Attempt> {
        if self.status.is_terminal() {
            return Err(VerifyError::InvalidState(format!(
                "run {} already {}",
                self.id, self.status
            )));
        }
        if self.attempt_count() >= self.max_retries {
            return Err(VerifyError::InvalidState(format!(
                "run {} already used {} of {} attempts",
                self.id,
                self.attempt_count(),
                self.max_retries
            )));
        }
        let number = self.attempt_count() + 1;
        self.attempts.push(Attempt {
            number,
            prompt: prompt.into(),
            ..Default::default()
        });
        let last = self.attempts.len() - 1;
        Ok(&mut self.attempts[last])
    }

    pub fn current_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    pub fn current_attempt_mut(&mut self) -> Option<&mut Attempt> {
        self.attempts.last_mut()
    }

    /// Move to a terminal status. Requires at least one attempt.
    pub fn finish(&mut self, status: RunStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(VerifyError::InvalidState(
                "cannot finish a run as RUNNING".to_string(),
            ));
        }
        if self.attempts.is_empty() {
            return Err(VerifyError::InvalidState(format!(
                "run {} has no attempts",
                self.id
            )));
        }
        self.status = status;
        self.finished_at = Some(Local::now());
        Ok(())
    }

    /// The failure category of the last attempt, if any.
    pub fn last_failure(&self) -> Option<FailureCategory> {
        self.attempts.last().and_then(|a| a.failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::ExecutionStatus;

    #[test]
    fn test_new_record_is_running() {
        let record = RunRecord::new("write a fizzbuzz", 3);
        assert_eq!(record.status, RunStatus::Running);
        assert_eq!(record.attempt_count(), 0);
        assert!(record.can_retry());
    }

    #[test]
    fn test_finish_without_attempts_is_rejected() {
        let mut record = RunRecord::new("task", 3);
        let err = record.finish(RunStatus::Succeeded).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidState(_)));
        assert_eq!(record.status, RunStatus::Running);
    }

    #[test]
    fn test_attempts_bounded_by_max_retries() {
        let mut record = RunRecord::new("task", 2);
        record.begin_attempt("first").unwrap();
        record.begin_attempt("second").unwrap();
        assert!(!record.can_retry());
        assert!(record.begin_attempt("third").is_err());
        assert_eq!(record.attempt_count(), 2);
        assert_eq!(record.attempts[1].number, 2);
    }

    #[test]
    fn test_finish_sets_terminal_status() {
        let mut record = RunRecord::new("task", 3);
        record.begin_attempt("p").unwrap();
        record.finish(RunStatus::Failed).unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert!(record.finished_at.is_some());
        assert!(record.begin_attempt("again").is_err());
    }

    #[test]
    fn test_finish_as_running_is_rejected() {
        let mut record = RunRecord::new("task", 3);
        record.begin_attempt("p").unwrap();
        assert!(record.finish(RunStatus::Running).is_err());
    }

    #[test]
    fn test_attempt_passed() {
        let mut attempt = Attempt::default();
        attempt.results.push(ExecutionResult::new(
            "a.py",
            Target::Local,
            ExecutionStatus::Success,
        ));
        assert!(attempt.passed());

        attempt.acceptance.push(AcceptanceReport::fail("kill", "alive"));
        assert!(!attempt.passed());
    }

    #[test]
    fn test_record_serializes() {
        let mut record = RunRecord::new("task", 3);
        record.begin_attempt("p").unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"number\":1"));
    }
}
