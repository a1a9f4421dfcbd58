//! Failure categories and acceptance verdicts.

use serde::{Deserialize, Serialize};

/// Why an attempt failed.
///
/// Compilation, execution, and acceptance failures are fed back to the chat
/// and retried. Extraction and transport failures end the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// No code could be recovered from the response
    Extraction,
    /// A compiler rejected the generated source
    Compilation,
    /// Non-zero exit or an unproductive timeout
    Execution,
    /// The program ran cleanly but the task's effect is not visible
    Acceptance,
    /// Chat session or remote host unreachable
    Transport,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Extraction => "extraction",
            FailureCategory::Compilation => "compilation",
            FailureCategory::Execution => "execution",
            FailureCategory::Acceptance => "acceptance",
            FailureCategory::Transport => "transport",
        }
    }

    /// Whether a failure of this kind earns another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureCategory::Compilation | FailureCategory::Execution | FailureCategory::Acceptance
        )
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of evaluating one acceptance test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceReport {
    pub name: String,
    pub passed: bool,
    pub reason: String,
    /// Ordered key/value evidence lines
    #[serde(default)]
    pub evidence: Vec<(String, String)>,
}

impl AcceptanceReport {
    pub fn pass(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            reason: reason.into(),
            evidence: Vec::new(),
        }
    }

    pub fn fail(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            reason: reason.into(),
            evidence: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.evidence.push((key.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_categories() {
        assert!(FailureCategory::Compilation.is_retryable());
        assert!(FailureCategory::Execution.is_retryable());
        assert!(FailureCategory::Acceptance.is_retryable());
        assert!(!FailureCategory::Extraction.is_retryable());
        assert!(!FailureCategory::Transport.is_retryable());
    }

    #[test]
    fn test_category_display() {
        assert_eq!(FailureCategory::Acceptance.to_string(), "acceptance");
    }

    #[test]
    fn test_report_evidence_keeps_order() {
        let report = AcceptanceReport::fail("kill", "still alive")
            .with_evidence("pre_targets", "1234")
            .with_evidence("post_surviving", "1234");
        assert!(!report.passed);
        assert_eq!(report.evidence[0].0, "pre_targets");
        assert_eq!(report.evidence[1].0, "post_surviving");
    }
}
