//! Global configuration.
//!
//! Loaded from ./.verifybot.yml or ~/.config/verifybot/verifybot.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use verifybot::acceptance::AcceptanceSettings;
use verifybot::chat::ChatSettings;
use verifybot::exec::ExecutionSettings;
use verifybot::extract::ExtractionSettings;
use verifybot::runner::RetrySettings;

/// Global configuration for VerifyBot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Browser and chat page settings.
    pub chat: ChatSettings,

    /// Timeouts and the remote work directory.
    pub execution: ExecutionSettings,

    /// Attempt limit.
    pub retry: RetrySettings,

    /// Local directories and files.
    pub paths: PathsConfig,

    /// SSH connection settings.
    pub remote: RemoteConfig,

    /// Acceptance probes.
    pub acceptance: AcceptanceSettings,

    /// Extraction thresholds.
    pub extraction: ExtractionSettings,
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .verifybot.yml in current directory
    /// 3. ~/.config/verifybot/verifybot.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".verifybot.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .verifybot.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .verifybot.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("verifybot").join("verifybot.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_retries == 0 {
            eyre::bail!("retry.max-retries must be > 0");
        }
        if self.execution.timeout_secs == 0 {
            eyre::bail!("execution.timeout-secs must be > 0");
        }
        if self.execution.compile_timeout_secs == 0 {
            eyre::bail!("execution.compile-timeout-secs must be > 0");
        }
        if self.chat.response_timeout_secs == 0 {
            eyre::bail!("chat.response-timeout-secs must be > 0");
        }
        if self.extraction.min_timeout_secs > self.extraction.max_timeout_secs {
            eyre::bail!("extraction.min-timeout-secs must not exceed extraction.max-timeout-secs");
        }
        if self.remote.connect_timeout_secs == 0 {
            eyre::bail!("remote.connect-timeout-secs must be > 0");
        }
        Ok(())
    }
}

/// Local directories and files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PathsConfig {
    /// Where extracted programs are saved.
    pub dest_dir: PathBuf,

    /// Where run transcripts are written; defaults under the data dir.
    pub transcript_dir: Option<PathBuf>,

    /// Key-value file holding the remote host credentials.
    pub credentials_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dest_dir: PathBuf::from("generated"),
            transcript_dir: None,
            credentials_file: PathBuf::from(".env"),
        }
    }
}

impl PathsConfig {
    pub fn resolved_transcript_dir(&self) -> PathBuf {
        self.transcript_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("verifybot")
                .join("transcripts")
        })
    }
}

/// SSH connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RemoteConfig {
    pub connect_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.execution.timeout_secs, 30);
        assert_eq!(config.paths.credentials_file, PathBuf::from(".env"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_partial() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("verifybot.yml");
        fs::write(
            &path,
            "retry:\n  max-retries: 5\nexecution:\n  remote-dir: ~/work\npaths:\n  dest-dir: out\n",
        )
        .unwrap();

        let config = GlobalConfig::load(Some(&path)).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.execution.remote_dir, "~/work");
        assert_eq!(config.execution.timeout_secs, 30);
        assert_eq!(config.paths.dest_dir, PathBuf::from("out"));
        assert!(config.acceptance.enabled);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let path = PathBuf::from("/nonexistent/verifybot.yml");
        assert!(GlobalConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let mut config = GlobalConfig::default();
        config.retry.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = GlobalConfig::default();
        config.execution.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transcript_dir_override() {
        let paths = PathsConfig {
            transcript_dir: Some(PathBuf::from("/tmp/t")),
            ..Default::default()
        };
        assert_eq!(paths.resolved_transcript_dir(), PathBuf::from("/tmp/t"));
    }
}
