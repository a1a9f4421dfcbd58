//! The generate/execute/check/retry loop.
//!
//! One run is a small state machine over `RunStatus`. Each attempt sends a
//! message (the task first, feedback afterwards), extracts and saves the
//! code, runs it, checks acceptance, and either finishes the run or loops
//! with feedback in the same conversation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::feedback::FeedbackFormatter;
use crate::acceptance::{AcceptanceSettings, AcceptanceTest, Prober, tests_for};
use crate::chat::ChatSession;
use crate::classify::TargetClassifier;
use crate::domain::{Attempt, BlockKind, CodeBlock, ExecutionResult, ExecutionStatus, FailureCategory, Placement, RunRecord, RunStatus, Target};
use crate::error::{Result, VerifyError};
use crate::exec::{Executor, RemoteHost, command_script};
use crate::extract::{Extraction, ExtractionSettings, Extractor};
use crate::prompt::initial_prompt;
use crate::transcript::Transcript;

/// Retry limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetrySettings {
    /// Total attempts per run, the first one included
    pub max_retries: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Everything a pipeline needs besides its chat session and executor.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub extraction: ExtractionSettings,
    pub acceptance: AcceptanceSettings,
    pub retry: RetrySettings,
    pub target_override: Option<Target>,
    /// Local directory every program is saved into
    pub dest_dir: PathBuf,
    pub transcript_dir: Option<PathBuf>,
    /// Stop after extraction and save
    pub no_run: bool,
    /// Install declared dependencies before running
    pub install_deps: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            extraction: ExtractionSettings::default(),
            acceptance: AcceptanceSettings::default(),
            retry: RetrySettings::default(),
            target_override: None,
            dest_dir: PathBuf::from("."),
            transcript_dir: None,
            no_run: false,
            install_deps: false,
        }
    }
}

/// Progress hooks for the operator-facing output.
pub trait RunObserver: Send + Sync {
    fn attempt_started(&self, _number: u32, _max: u32) {}

    fn attempt_finished(&self, _attempt: &Attempt) {}
}

/// Observer that ignores everything.
pub struct NoOpObserver;

impl RunObserver for NoOpObserver {}

/// Drives runs against one chat session and one executor.
pub struct Pipeline<C, H>
where
    C: ChatSession,
    H: RemoteHost,
{
    chat: Arc<C>,
    executor: Executor<H>,
    extractor: Extractor,
    classifier: TargetClassifier,
    feedback: FeedbackFormatter,
    settings: PipelineSettings,
}

impl<C, H> Pipeline<C, H>
where
    C: ChatSession,
    H: RemoteHost,
{
    pub fn new(chat: Arc<C>, executor: Executor<H>, settings: PipelineSettings) -> Self {
        Self {
            chat,
            executor,
            extractor: Extractor::new(settings.extraction.clone()),
            classifier: TargetClassifier::new(settings.target_override),
            feedback: FeedbackFormatter::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn run(&self, task: &str) -> Result<RunRecord> {
        self.run_with(task, &NoOpObserver).await
    }

    /// Run `task` to SUCCEEDED or FAILED.
    ///
    /// Chat and transport errors end the run as FAILED and are recorded on
    /// the attempt; only local IO and internal errors are returned.
    pub async fn run_with(&self, task: &str, observer: &dyn RunObserver) -> Result<RunRecord> {
        let mut record = RunRecord::new(task, self.settings.retry.max_retries);
        let run_target = self.classifier.classify_prompt(task).target;
        record.target = Some(run_target);
        log::info!(
            "Run {} started: target {}, up to {} attempt(s)",
            record.id,
            run_target,
            record.max_retries
        );

        let transcript = match &self.settings.transcript_dir {
            Some(dir) => Some(Transcript::create(dir, &record)?),
            None => None,
        };

        let tests = if self.settings.acceptance.enabled && !self.settings.no_run {
            tests_for(task, &self.settings.acceptance)
        } else {
            Vec::new()
        };
        if !tests.is_empty() {
            let names: Vec<String> = tests.iter().map(AcceptanceTest::name).collect();
            log::info!("Acceptance tests: {}", names.join(", "));
        }

        let max = record.max_retries;
        let mut message = initial_prompt(task, run_target, &self.executor.settings().remote_dir);
        let status = loop {
            observer.attempt_started(record.attempt_count() + 1, max);
            let first = record.attempt_count() == 0;
            let attempt = record.begin_attempt(message.as_str())?;

            match self.attempt(task, first, &tests, attempt).await {
                Ok(()) => {}
                Err(e) if e.is_transport() || matches!(e, VerifyError::Chat(_)) => {
                    log::error!("Attempt {} aborted: {}", attempt.number, e);
                    attempt.failure = Some(FailureCategory::Transport);
                    attempt.error = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }

            let failure = attempt.failure;
            let retry = failure.is_some_and(|f| f.is_retryable()) && attempt.number < max;
            if retry {
                let feedback = self.feedback_for(attempt);
                message = feedback.clone();
                attempt.feedback = Some(feedback);
            }

            observer.attempt_finished(attempt);
            if let Some(t) = &transcript {
                t.record_attempt(attempt)?;
            }

            match failure {
                None => break RunStatus::Succeeded,
                Some(category) if retry => {
                    log::warn!("Attempt failed ({}), sending feedback", category);
                }
                Some(category) => {
                    log::warn!("Attempt failed ({}), giving up", category);
                    break RunStatus::Failed;
                }
            }
        };

        record.finish(status)?;
        log::info!("Run {} finished {} after {} attempt(s)", record.id, status, record.attempt_count());
        if let Some(t) = &transcript {
            t.record_final(&record)?;
        }
        Ok(record)
    }

    /// One message/extract/execute/check cycle, recorded into `attempt`.
    async fn attempt(&self, task: &str, first: bool, tests: &[AcceptanceTest], attempt: &mut Attempt) -> Result<()> {
        attempt.response = if first {
            self.chat.prompt(&attempt.prompt).await?
        } else {
            self.chat.followup(&attempt.prompt).await?
        };

        let extraction = self.extractor.extract(&attempt.response, task);
        attempt.blocks = extraction.blocks.clone();
        attempt.junk = extraction
            .junk
            .iter()
            .map(|j| (j.rule.clone(), j.preview(80)))
            .collect();
        if extraction.is_empty() {
            log::warn!("No code found in the response");
            attempt.failure = Some(FailureCategory::Extraction);
            return Ok(());
        }

        attempt.placements = extraction
            .blocks
            .iter()
            .map(|block| {
                let c = self.classifier.classify(task, block);
                log::info!("{} -> {} ({})", block.filename, c.target, c.rule);
                Placement {
                    filename: block.filename.clone(),
                    target: c.target,
                    rule: c.rule.to_string(),
                }
            })
            .collect();

        save_programs(&self.settings.dest_dir, &extraction.blocks).await?;
        if self.settings.no_run {
            log::info!("Saved {} block(s), not running", extraction.blocks.len());
            return Ok(());
        }

        let run_target = attempt.placements.first().map(|p| p.target).unwrap_or(Target::Local);
        if self.settings.install_deps && !extraction.hints.dependencies.is_empty() {
            for outcome in self
                .executor
                .install_dependencies(run_target, &extraction.hints.dependencies)
                .await?
            {
                log::info!("Install {}: {} {}", outcome.package, outcome.installed, outcome.detail);
            }
        }

        let shell = self.executor.shell_for(run_target)?;
        let work_dir = self.executor.work_dir(run_target, &self.settings.dest_dir);
        let prober = Prober::new(shell, &work_dir, &self.settings.acceptance);
        let pre = prober.capture(tests).await?;

        let timeout = self.timeout_for(&extraction);
        for (block, placement) in extraction.blocks.iter().zip(&attempt.placements) {
            let result = self
                .executor
                .execute(block, &self.settings.dest_dir, placement.target, timeout)
                .await?;
            attempt.results.push(result);
        }

        if let Some(failed) = attempt.results.iter().find(|r| !r.is_success()) {
            attempt.failure = Some(if failed.status == ExecutionStatus::CompileFailed {
                FailureCategory::Compilation
            } else {
                FailureCategory::Execution
            });
            return Ok(());
        }
        if nothing_ran(&attempt.results) {
            log::warn!("No kept block was executed, only headers were found");
            attempt.failure = Some(FailureCategory::Execution);
            return Ok(());
        }

        if !tests.is_empty() {
            attempt.acceptance = prober.evaluate(tests, &pre, &harness_files(&extraction.blocks)).await?;
            if attempt.acceptance.iter().any(|r| !r.passed) {
                attempt.failure = Some(FailureCategory::Acceptance);
            }
        }
        Ok(())
    }

    fn timeout_for(&self, extraction: &Extraction) -> std::time::Duration {
        extraction
            .hints
            .timeout_secs
            .map(std::time::Duration::from_secs)
            .unwrap_or_else(|| self.executor.settings().timeout())
    }

    fn feedback_for(&self, attempt: &Attempt) -> String {
        match attempt.failure {
            Some(FailureCategory::Acceptance) => self.feedback.format_acceptance(&attempt.acceptance),
            _ => self.feedback.format_execution(&attempt.results),
        }
    }
}

/// Write every program block into `dest_dir`.
async fn save_programs(dest_dir: &Path, blocks: &[CodeBlock]) -> Result<()> {
    tokio::fs::create_dir_all(dest_dir).await?;
    for block in blocks.iter().filter(|b| b.kind == BlockKind::Program) {
        let path = dest_dir.join(&block.filename);
        tokio::fs::write(&path, format!("{}\n", block.code)).await?;
        log::debug!("Saved {}", path.display());
    }
    Ok(())
}

/// True when every result was a skipped header, so nothing was executed.
fn nothing_ran(results: &[ExecutionResult]) -> bool {
    results.iter().all(|r| r.status == ExecutionStatus::Skipped)
}

/// Files the harness itself puts in the work dir: sources, command scripts, and build outputs.
fn harness_files(blocks: &[CodeBlock]) -> Vec<String> {
    let mut files = Vec::new();
    for block in blocks {
        if block.kind == BlockKind::DirectCommand {
            files.push(command_script(&block.filename));
            continue;
        }
        files.push(block.filename.clone());
        if let Some(stem) = Path::new(&block.filename).file_stem().and_then(|s| s.to_str()) {
            files.push(stem.to_string());
            files.push(format!("{}.o", stem));
        }
    }
    files
}
