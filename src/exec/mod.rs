//! Execution of kept blocks on their resolved target.
//!
//! Programs are saved locally first; remote targets get a copy uploaded to
//! the remote work directory. Interpreted files run directly, compiled
//! files are built first, and STM32 sources are only cross-compiled.

pub mod process;
pub mod remote;
pub mod shell;
pub mod snapshot;
pub mod toolchain;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{BlockKind, CodeBlock, ExecutionResult, ExecutionStatus, Target};
use crate::error::{Result, VerifyError};

pub use remote::SshHost;
pub use shell::{LocalShell, RemoteHost, Shell, ShellOutput};
pub use snapshot::{DirSnapshot, FileStamp};
pub use toolchain::{RunPlan, command_script, long_running_hint, plan_for, shell_quote};

/// Execution limits and locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExecutionSettings {
    /// Run timeout when the response carries no `TIMEOUT:` hint
    pub timeout_secs: u64,
    pub compile_timeout_secs: u64,
    /// Work directory on the remote host
    pub remote_dir: String,
    pub install_timeout_secs: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            compile_timeout_secs: 30,
            remote_dir: "~/Documents".to_string(),
            install_timeout_secs: 120,
        }
    }
}

impl ExecutionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }
}

/// Outcome of one dependency install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub package: String,
    pub installed: bool,
    pub detail: String,
}

/// Runs blocks locally or through a remote host.
pub struct Executor<H: RemoteHost> {
    local: LocalShell,
    remote: Option<Arc<H>>,
    settings: ExecutionSettings,
}

impl<H: RemoteHost> Executor<H> {
    pub fn new(settings: ExecutionSettings, remote: Option<Arc<H>>) -> Self {
        Self {
            local: LocalShell::new(),
            remote,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    fn remote(&self, target: Target) -> Result<&H> {
        self.remote.as_deref().ok_or_else(|| {
            VerifyError::Credentials(format!(
                "target {} needs the remote host but no credentials were loaded",
                target
            ))
        })
    }

    /// The command channel for `target`.
    pub fn shell_for(&self, target: Target) -> Result<&dyn Shell> {
        if target.is_remote() {
            Ok(self.remote(target)? as &dyn Shell)
        } else {
            Ok(&self.local)
        }
    }

    /// Directory a block runs in on `target`.
    pub fn work_dir(&self, target: Target, dest_dir: &Path) -> String {
        if target.is_remote() {
            self.settings.remote_dir.trim_end_matches('/').to_string()
        } else {
            dest_dir.to_string_lossy().into_owned()
        }
    }

    /// Run one kept block. Programs must already be saved under `dest_dir`.
    ///
    /// Only transport problems surface as errors; everything the program
    /// itself does wrong is reported in the result.
    pub async fn execute(
        &self,
        block: &CodeBlock,
        dest_dir: &Path,
        target: Target,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        let work_dir = self.work_dir(target, dest_dir);
        let result = match block.kind {
            BlockKind::DirectCommand => {
                self.run_command(block, dest_dir, target, &work_dir, timeout)
                    .await?
            }
            BlockKind::Program => {
                let local_path = dest_dir.join(&block.filename);
                self.run_program(block, &local_path, target, &work_dir, timeout).await?
            }
        };
        if target.is_remote() {
            self.fetch_outputs(&result, &block.filename, &work_dir, dest_dir).await;
        }
        Ok(result)
    }

    /// Copy files a remote run wrote back next to the local sources.
    ///
    /// Only top-level files are fetched; a failed copy is logged and skipped.
    async fn fetch_outputs(&self, result: &ExecutionResult, source: &str, work_dir: &str, dest_dir: &Path) {
        let Some(remote) = self.remote.as_deref() else {
            return;
        };
        for name in result
            .files_changed
            .iter()
            .filter(|f| !f.contains('/') && f.as_str() != source)
        {
            let remote_path = format!("{}/{}", work_dir, name);
            match remote.download(&remote_path, &dest_dir.join(name)).await {
                Ok(()) => log::info!("Fetched {} from {}", name, remote.describe()),
                Err(e) => log::warn!("Fetching {} failed: {}", name, e),
            }
        }
    }

    /// Run a direct command from a script file in the work dir.
    ///
    /// `pkill -f` matches full command lines, so the command text must not
    /// appear in the argv of any shell wrapping it.
    async fn run_command(
        &self,
        block: &CodeBlock,
        dest_dir: &Path,
        target: Target,
        work_dir: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        let shell = self.shell_for(target)?;
        let script = command_script(&block.filename);
        let local_path = dest_dir.join(&script);
        tokio::fs::create_dir_all(dest_dir).await?;
        tokio::fs::write(&local_path, format!("{}\n", block.code)).await?;
        if target.is_remote() {
            let remote = self.remote(target)?;
            remote.ensure_dir(work_dir).await?;
            remote.upload(&local_path, &format!("{}/{}", work_dir, script)).await?;
        }
        log::info!("Running direct command on {}: {}", shell.describe(), block.preview(80));
        let run = format!("sh {}", shell_quote(&script));
        self.supervise(shell, &block.code, &run, target, work_dir, timeout)
            .await
    }

    async fn run_program(
        &self,
        block: &CodeBlock,
        local_path: &Path,
        target: Target,
        work_dir: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        let (compile, run) = match plan_for(&block.filename, &block.language, target) {
            RunPlan::Skip(reason) => {
                log::info!("Skipping {}: {}", block.filename, reason);
                return Ok(ExecutionResult::skipped(&block.filename, target, reason));
            }
            RunPlan::Unrunnable(reason) => {
                log::warn!("Cannot run {} on {}: {}", block.filename, target, reason);
                return Ok(ExecutionResult::unrunnable(&block.filename, target, reason));
            }
            RunPlan::Interpret { command } => (None, Some(command)),
            RunPlan::CompileThenRun { compile, run } => (Some(compile), Some(run)),
            RunPlan::CompileOnly { compile } => (Some(compile), None),
        };

        let shell = self.shell_for(target)?;
        if target.is_remote() {
            let remote = self.remote(target)?;
            remote.ensure_dir(work_dir).await?;
            let remote_path = format!("{}/{}", work_dir, block.filename);
            remote.upload(local_path, &remote_path).await?;
        }

        if let Some(compile) = compile {
            if let Some(failed) = self
                .compile(shell, &compile, &block.filename, target, work_dir)
                .await?
            {
                return Ok(failed);
            }
        }
        let Some(run) = run else {
            return Ok(
                ExecutionResult::new(&block.filename, target, ExecutionStatus::Success)
                    .with_note("compile-checked only, no on-target execution"),
            );
        };

        let mut result = self
            .supervise(shell, &block.filename, &run, target, work_dir, timeout)
            .await?;
        if result.status == ExecutionStatus::ProductiveTimeout && long_running_hint(&block.code) {
            result = result.with_note("long-running program, stopped at the timeout");
        }
        Ok(result)
    }

    /// Compile in `work_dir`; `Some(result)` when the compiler rejected the source.
    async fn compile(
        &self,
        shell: &dyn Shell,
        compile: &str,
        name: &str,
        target: Target,
        work_dir: &str,
    ) -> Result<Option<ExecutionResult>> {
        log::info!("Compiling {} on {}", name, shell.describe());
        let command = format!("cd {} && {}", snapshot::remote_dir_arg(work_dir), compile);
        let out = shell.run(&command, self.settings.compile_timeout()).await?;
        if out.success() {
            return Ok(None);
        }
        let mut result = ExecutionResult::new(name, target, ExecutionStatus::CompileFailed);
        result.exit_code = out.exit_code;
        result.stdout = out.stdout;
        result.stderr = if out.timed_out {
            format!("compilation timed out after {}s\n{}", self.settings.compile_timeout_secs, out.stderr)
        } else {
            out.stderr
        };
        result.elapsed_ms = out.elapsed_ms;
        Ok(Some(result))
    }

    /// Run `command` in `work_dir`, diffing the directory around it.
    async fn supervise(
        &self,
        shell: &dyn Shell,
        name: &str,
        command: &str,
        target: Target,
        work_dir: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        let before = shell.list_dir(work_dir).await?;
        let line = format!("cd {} && {}", snapshot::remote_dir_arg(work_dir), command);
        let out = shell.run(&line, timeout).await?;
        let after = shell.list_dir(work_dir).await?;
        let files_changed = after.changed_since(&before);

        let status = classify_output(&out, &files_changed);
        log::info!(
            "{} on {} finished as {} (exit {:?}, {} ms, {} file(s) changed)",
            name,
            shell.describe(),
            status,
            out.exit_code,
            out.elapsed_ms,
            files_changed.len()
        );

        let mut result = ExecutionResult::new(name, target, status);
        result.exit_code = out.exit_code;
        result.stdout = out.stdout;
        result.stderr = out.stderr;
        result.elapsed_ms = out.elapsed_ms;
        result.files_changed = files_changed;
        Ok(result)
    }

    /// Install declared packages on `target`, one at a time.
    pub async fn install_dependencies(&self, target: Target, packages: &[String]) -> Result<Vec<InstallOutcome>> {
        let shell = self.shell_for(target)?;
        let timeout = Duration::from_secs(self.settings.install_timeout_secs);
        let mut outcomes = Vec::new();
        for package in packages {
            let command = if target.is_remote() {
                format!("pip3 install {} --break-system-packages", shell_quote(package))
            } else {
                format!("python3 -m pip install {}", shell_quote(package))
            };
            log::info!("Installing {} on {}", package, shell.describe());
            let out = shell.run(&command, timeout).await?;
            let detail = if out.success() {
                out.stdout.lines().last().unwrap_or_default().to_string()
            } else {
                out.stderr.trim().to_string()
            };
            if !out.success() {
                log::warn!("Installing {} failed: {}", package, detail);
            }
            outcomes.push(InstallOutcome {
                package: package.clone(),
                installed: out.success(),
                detail,
            });
        }
        Ok(outcomes)
    }
}

/// Status of a finished (or killed) run.
///
/// A timeout counts as productive when the program printed to stdout or
/// touched the work directory before it was killed.
pub fn classify_output(out: &ShellOutput, files_changed: &[String]) -> ExecutionStatus {
    if out.timed_out {
        if !out.stdout.trim().is_empty() || !files_changed.is_empty() {
            ExecutionStatus::ProductiveTimeout
        } else {
            ExecutionStatus::Timeout
        }
    } else if out.exit_code == Some(0) {
        ExecutionStatus::Success
    } else {
        ExecutionStatus::Crash
    }
}
