//! Configuration for the verifybot binary.
//!
//! One YAML file with a section per component. CLI flags are applied on
//! top of the loaded file by `ConfigOverrides::apply_to`.

use eyre::Result;
use std::path::PathBuf;

pub use self::global::GlobalConfig;

mod global;

pub type Config = GlobalConfig;

/// Values given on the command line that replace config file values.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub remote_dir: Option<String>,
    pub dest_dir: Option<PathBuf>,
    pub headless: bool,
}

impl ConfigOverrides {
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(max) = self.max_retries {
            config.retry.max_retries = max;
        }
        if let Some(secs) = self.timeout_secs {
            config.execution.timeout_secs = secs;
        }
        if let Some(dir) = &self.remote_dir {
            config.execution.remote_dir = dir.clone();
        }
        if let Some(dir) = &self.dest_dir {
            config.paths.dest_dir = dir.clone();
        }
        if self.headless {
            config.chat.headless = true;
        }
    }
}

/// Load configuration from the standard search paths.
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<Config> {
    GlobalConfig::load(explicit_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_only_given_values() {
        let mut config = Config::default();
        let overrides = ConfigOverrides {
            max_retries: Some(1),
            remote_dir: Some("~/scratch".to_string()),
            ..Default::default()
        };
        overrides.apply_to(&mut config);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.execution.remote_dir, "~/scratch");
        assert_eq!(config.execution.timeout_secs, 30);
        assert!(!config.chat.headless);
    }

    #[test]
    fn test_headless_flag() {
        let mut config = Config::default();
        ConfigOverrides {
            headless: true,
            ..Default::default()
        }
        .apply_to(&mut config);
        assert!(config.chat.headless);
    }
}
