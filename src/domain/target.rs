//! Execution targets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The machine an extracted block runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    /// This machine
    Local,
    /// Raspberry Pi reached over SSH
    RemotePrimary,
    /// STM32 firmware, built through the Pi
    RemoteSecondary,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Local => "local",
            Target::RemotePrimary => "raspi",
            Target::RemoteSecondary => "stm32",
        }
    }

    /// Human-readable description used in prompts and the transcript.
    pub fn describe(&self) -> &'static str {
        match self {
            Target::Local => "Local machine",
            Target::RemotePrimary => "Raspberry Pi (remote via SSH)",
            Target::RemoteSecondary => "STM32 (cross-compiled on the Raspberry Pi)",
        }
    }

    /// Whether reaching this target requires the SSH credentials.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Target::Local)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Target::Local),
            "raspi" | "pi" | "rpi" | "remote-primary" => Ok(Target::RemotePrimary),
            "stm32" | "mcu" | "remote-secondary" => Ok(Target::RemoteSecondary),
            other => Err(format!("unknown target '{}' (expected local, raspi, or stm32)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets() {
        assert_eq!("local".parse::<Target>().unwrap(), Target::Local);
        assert_eq!("raspi".parse::<Target>().unwrap(), Target::RemotePrimary);
        assert_eq!("Pi".parse::<Target>().unwrap(), Target::RemotePrimary);
        assert_eq!("stm32".parse::<Target>().unwrap(), Target::RemoteSecondary);
        assert!("toaster".parse::<Target>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for target in [Target::Local, Target::RemotePrimary, Target::RemoteSecondary] {
            assert_eq!(target.to_string().parse::<Target>().unwrap(), target);
        }
    }

    #[test]
    fn test_is_remote() {
        assert!(!Target::Local.is_remote());
        assert!(Target::RemotePrimary.is_remote());
        assert!(Target::RemoteSecondary.is_remote());
    }
}
