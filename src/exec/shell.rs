//! Command channels: the local shell and the seam remote hosts implement.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::process::{ProcessOutput, run_streaming};
use super::snapshot::{DirSnapshot, listing_command, remote_dir_arg};
use crate::error::{Result, VerifyError};

/// How long a directory listing may take.
const LISTING_TIMEOUT: Duration = Duration::from_secs(15);

/// Output of a shell command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

impl From<ProcessOutput> for ShellOutput {
    fn from(out: ProcessOutput) -> Self {
        Self {
            exit_code: out.exit_code,
            stdout: out.stdout,
            stderr: out.stderr,
            timed_out: out.timed_out,
            elapsed_ms: out.elapsed.as_millis() as u64,
        }
    }
}

/// Something that runs shell command lines.
#[async_trait]
pub trait Shell: Send + Sync {
    /// Run `command` through `sh -c`, killing it after `timeout`.
    async fn run(&self, command: &str, timeout: Duration) -> Result<ShellOutput>;

    /// List files under `dir` for change detection.
    async fn list_dir(&self, dir: &str) -> Result<DirSnapshot> {
        let out = self.run(&listing_command(dir), LISTING_TIMEOUT).await?;
        Ok(DirSnapshot::parse_listing(&out.stdout))
    }

    /// Short label for logs ("local", "pi@raspberrypi.local").
    fn describe(&self) -> String;
}

/// Files in and out of a remote machine, plus its shell.
#[async_trait]
pub trait RemoteHost: Shell {
    /// Copy a local file to `remote` (a file path on the host).
    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    /// Copy `remote` from the host to `local`.
    async fn download(&self, remote: &str, local: &Path) -> Result<()>;

    /// Create `dir` (with parents) on the host.
    async fn ensure_dir(&self, dir: &str) -> Result<()> {
        let out = self
            .run(&format!("mkdir -p {}", remote_dir_arg(dir)), LISTING_TIMEOUT)
            .await?;
        if out.success() {
            Ok(())
        } else {
            Err(VerifyError::Transport(format!(
                "mkdir {} on {} failed: {}",
                dir,
                self.describe(),
                out.stderr.trim()
            )))
        }
    }
}

/// The machine verifybot runs on.
#[derive(Debug, Clone, Default)]
pub struct LocalShell {
    /// Directory commands start in; the process cwd when `None`
    cwd: Option<PathBuf>,
}

impl LocalShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
        }
    }
}

#[async_trait]
impl Shell for LocalShell {
    async fn run(&self, command: &str, timeout: Duration) -> Result<ShellOutput> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        log::debug!("local: {}", command);
        Ok(run_streaming(cmd, timeout).await?.into())
    }

    async fn list_dir(&self, dir: &str) -> Result<DirSnapshot> {
        let path = match dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir().unwrap_or_default().join(rest),
            None => PathBuf::from(dir),
        };
        Ok(DirSnapshot::capture(&path))
    }

    fn describe(&self) -> String {
        "local".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_run() {
        let shell = LocalShell::new();
        let out = shell.run("echo one && echo two >&2", Duration::from_secs(5)).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "one");
        assert_eq!(out.stderr.trim(), "two");
    }

    #[tokio::test]
    async fn test_local_run_in_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let shell = LocalShell::in_dir(dir.path());
        let out = shell.run("ls", Duration::from_secs(5)).await.unwrap();
        assert!(out.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_local_list_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "print(1)").unwrap();
        let shell = LocalShell::new();
        let snap = shell.list_dir(&dir.path().to_string_lossy()).await.unwrap();
        assert!(snap.contains("a.py"));
    }

    #[tokio::test]
    async fn test_timeout_reported() {
        let shell = LocalShell::new();
        let out = shell.run("sleep 5", Duration::from_millis(200)).await.unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
    }
}
