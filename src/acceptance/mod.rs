//! Acceptance testing by pre/post state diffing.
//!
//! Exit code 0 says nothing about whether a "kill the counter" task
//! actually killed the counter. Tests are derived from the prompt before
//! any code exists, state is captured before execution and again after,
//! and each test judges the difference.

pub mod checker;
pub mod intent;
pub mod process_list;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use checker::{AcceptanceTest, Prober, StateSnapshot, tests_for};
pub use intent::{Intent, classify_intent};
pub use process_list::{ProcessFilter, ProcessInfo};

/// Acceptance probe configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AcceptanceSettings {
    pub enabled: bool,
    /// Process owners never treated as kill targets
    pub ignored_owners: Vec<String>,
    /// Command-line fragments never treated as kill targets
    pub ignored_commands: Vec<String>,
    /// Output file sampled by the stability probe when the prompt names none
    pub stability_file: String,
    /// Delay between the two stability samples
    pub stability_delay_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for AcceptanceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ignored_owners: [
                "root",
                "daemon",
                "messagebus",
                "avahi",
                "systemd-network",
                "systemd-resolve",
                "systemd-timesync",
                "polkitd",
                "rtkit",
                "colord",
                "lightdm",
                "nobody",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ignored_commands: vec!["verifybot".to_string()],
            stability_file: "counter_log.txt".to_string(),
            stability_delay_secs: 3,
            probe_timeout_secs: 15,
        }
    }
}

impl AcceptanceSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn process_filter(&self) -> ProcessFilter {
        ProcessFilter {
            ignored_owners: self.ignored_owners.clone(),
            ignored_commands: self.ignored_commands.clone(),
        }
    }
}
