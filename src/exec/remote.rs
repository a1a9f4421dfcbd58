//! SSH-backed remote host using the system `ssh` and `scp` clients.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::process::run_streaming;
use super::shell::{RemoteHost, Shell, ShellOutput};
use super::toolchain::shell_quote;
use crate::credentials::Credentials;
use crate::error::{Result, VerifyError};

/// Exit status `timeout(1)` reports when it killed the command.
const REMOTE_TIMEOUT_EXIT: i32 = 124;

/// Exit status `ssh` reports for its own (connection) failures.
const SSH_TRANSPORT_EXIT: i32 = 255;

/// Extra wall-clock time granted on top of the remote timeout.
const TRANSPORT_SLACK: Duration = Duration::from_secs(5);

const COPY_TIMEOUT: Duration = Duration::from_secs(60);

/// Raspberry Pi (or any Linux box) reached over SSH.
#[derive(Debug, Clone)]
pub struct SshHost {
    credentials: Credentials,
    connect_timeout_secs: u64,
}

impl SshHost {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            connect_timeout_secs: 10,
        }
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Base command: `sshpass -e <program>` with a password, else the
    /// program in batch mode so it never prompts.
    fn base(&self, program: &str) -> Command {
        let mut cmd = match &self.credentials.password {
            Some(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg(program).env("SSHPASS", password);
                cmd
            }
            None => {
                let mut cmd = Command::new(program);
                cmd.arg("-o").arg("BatchMode=yes");
                cmd
            }
        };
        cmd.arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs));
        cmd
    }

    fn ssh(&self) -> Command {
        let mut cmd = self.base("ssh");
        cmd.arg("-p")
            .arg(self.credentials.port.to_string())
            .arg(self.credentials.destination());
        cmd
    }

    fn scp(&self) -> Command {
        let mut cmd = self.base("scp");
        cmd.arg("-q").arg("-P").arg(self.credentials.port.to_string());
        cmd
    }

    /// `user@host:path`. Left unquoted: scp expands `~` itself and
    /// generated filenames are plain words.
    fn remote_spec(&self, path: &str) -> String {
        format!("{}:{}", self.credentials.destination(), path)
    }

    async fn copy(&self, cmd: Command, what: &str) -> Result<()> {
        let out = run_streaming(cmd, COPY_TIMEOUT).await?;
        if out.success() {
            Ok(())
        } else if out.timed_out {
            Err(VerifyError::Transport(format!("{} timed out", what)))
        } else {
            Err(VerifyError::Transport(format!(
                "{} failed (exit {:?}): {}",
                what,
                out.exit_code,
                out.stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl Shell for SshHost {
    async fn run(&self, command: &str, timeout: Duration) -> Result<ShellOutput> {
        let secs = timeout.as_secs().max(1);
        let wrapped = format!("timeout -k 2 {} sh -c {}", secs, shell_quote(command));
        let mut cmd = self.ssh();
        cmd.arg(&wrapped);
        log::debug!("{}: {}", self.describe(), command);

        let mut out: ShellOutput = run_streaming(cmd, timeout + TRANSPORT_SLACK).await?.into();
        match out.exit_code {
            Some(REMOTE_TIMEOUT_EXIT) => {
                out.timed_out = true;
                out.exit_code = None;
            }
            Some(SSH_TRANSPORT_EXIT) => {
                return Err(VerifyError::Transport(format!(
                    "ssh to {} failed: {}",
                    self.describe(),
                    out.stderr.trim()
                )));
            }
            _ => {}
        }
        Ok(out)
    }

    fn describe(&self) -> String {
        self.credentials.destination()
    }
}

#[async_trait]
impl RemoteHost for SshHost {
    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let mut cmd = self.scp();
        cmd.arg(local).arg(self.remote_spec(remote));
        log::info!("Uploading {} to {}", local.display(), self.remote_spec(remote));
        self.copy(cmd, &format!("upload of {}", local.display())).await
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        let mut cmd = self.scp();
        cmd.arg(self.remote_spec(remote)).arg(local);
        log::info!("Downloading {} to {}", self.remote_spec(remote), local.display());
        self.copy(cmd, &format!("download of {}", remote)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(password: Option<&str>) -> SshHost {
        SshHost::new(Credentials {
            host: "raspberrypi.local".to_string(),
            user: "pi".to_string(),
            password: password.map(str::to_string),
            port: 2222,
        })
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_password_uses_sshpass() {
        let cmd = host(Some("pw")).ssh();
        assert_eq!(cmd.as_std().get_program(), "sshpass");
        let args = args(&cmd);
        assert_eq!(&args[..2], &["-e", "ssh"]);
        assert!(args.contains(&"pi@raspberrypi.local".to_string()));
        assert!(!args.iter().any(|a| a.contains("pw")));
    }

    #[test]
    fn test_key_auth_uses_batch_mode() {
        let cmd = host(None).ssh();
        assert_eq!(cmd.as_std().get_program(), "ssh");
        assert!(args(&cmd).contains(&"BatchMode=yes".to_string()));
        assert!(args(&cmd).contains(&"2222".to_string()));
    }

    #[test]
    fn test_scp_uses_capital_port_flag() {
        let args = args(&host(None).scp());
        let pos = args.iter().position(|a| a == "-P").unwrap();
        assert_eq!(args[pos + 1], "2222");
    }

    #[test]
    fn test_remote_spec_keeps_tilde() {
        assert_eq!(
            host(None).remote_spec("~/Documents/a.py"),
            "pi@raspberrypi.local:~/Documents/a.py"
        );
    }
}
