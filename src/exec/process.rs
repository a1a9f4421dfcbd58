//! Subprocess supervision with streaming capture.
//!
//! Output is drained into shared buffers while the child runs, so whatever a
//! program printed before it was killed at the timeout is still available.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{Result, VerifyError};

/// How long readers may keep draining after the child is gone.
const READER_GRACE: Duration = Duration::from_secs(2);

/// Everything captured from one child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

type Sink = Arc<Mutex<Vec<u8>>>;

fn drain<R>(reader: Option<R>, sink: Sink) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = reader?;
    Some(tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
            }
        }
    }))
}

async fn finish_reader(handle: Option<JoinHandle<()>>) {
    if let Some(mut handle) = handle {
        if tokio::time::timeout(READER_GRACE, &mut handle).await.is_err() {
            handle.abort();
        }
    }
}

/// Start the child in its own process group so a timeout kill reaches
/// anything it spawned.
#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

#[cfg(unix)]
async fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        let _ = Command::new("kill")
            .arg("-KILL")
            .arg(format!("-{}", pid))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }
}

#[cfg(not(unix))]
async fn kill_process_group(_pid: Option<u32>) {}

/// Run a command to completion or until `timeout`, capturing output as it
/// streams. On timeout the child (and its process group) is killed.
pub async fn run_streaming(mut cmd: Command, timeout: Duration) -> Result<ProcessOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    own_process_group(&mut cmd);

    let program = format!("{:?}", cmd.as_std().get_program());
    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| VerifyError::Process(format!("failed to start {}: {}", program, e)))?;

    let stdout: Sink = Arc::new(Mutex::new(Vec::new()));
    let stderr: Sink = Arc::new(Mutex::new(Vec::new()));
    let out_reader = drain(child.stdout.take(), stdout.clone());
    let err_reader = drain(child.stderr.take(), stderr.clone());

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => (status?.code(), false),
        Err(_) => {
            log::debug!("{} exceeded {:?}, killing", program, timeout);
            kill_process_group(child.id()).await;
            let _ = child.start_kill();
            let _ = child.wait().await;
            (None, true)
        }
    };

    finish_reader(out_reader).await;
    finish_reader(err_reader).await;

    let stdout = String::from_utf8_lossy(&stdout.lock().await).into_owned();
    let stderr = String::from_utf8_lossy(&stderr.lock().await).into_owned();

    Ok(ProcessOutput {
        exit_code,
        stdout,
        stderr,
        timed_out,
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let out = run_streaming(sh("echo hello; exit 3"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert!(!out.timed_out);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_captures_stderr() {
        let out = run_streaming(sh("echo oops >&2"), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_partial_output_survives_timeout() {
        let out = run_streaming(sh("echo tick; sleep 10; echo never"), Duration::from_millis(500))
            .await
            .unwrap();
        assert!(out.timed_out);
        assert!(out.exit_code.is_none());
        assert_eq!(out.stdout.trim(), "tick");
        assert!(out.elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_program_is_process_error() {
        let cmd = Command::new("definitely_not_a_real_binary_xyz");
        let err = run_streaming(cmd, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, VerifyError::Process(_)));
    }
}
