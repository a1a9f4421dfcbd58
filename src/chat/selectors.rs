//! Chat page locations, DOM selectors and browser timing.
//!
//! The chat frontend changes often; when automation breaks, the selector
//! table in the config file is the thing to update.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// CSS selectors for the chat page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Selectors {
    /// The prompt input (a contenteditable div)
    pub prompt_input: String,
    /// Send button candidates, tried in order
    pub send_buttons: Vec<String>,
    /// Assistant message containers; the last match is the newest reply
    pub assistant_messages: Vec<String>,
    /// Visible while a reply is still streaming
    pub stop_buttons: Vec<String>,
    /// Visible once a reply has finished
    pub complete_indicators: Vec<String>,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            prompt_input: "#prompt-textarea".to_string(),
            send_buttons: vec![
                r#"button[data-testid="send-button"]"#.to_string(),
                r#"button[aria-label="Send prompt"]"#.to_string(),
                r#"button[aria-label="Send"]"#.to_string(),
                r#"form button[type="submit"]"#.to_string(),
            ],
            assistant_messages: vec![
                r#"[data-message-author-role="assistant"]"#.to_string(),
                "div.agent-turn".to_string(),
            ],
            stop_buttons: vec![
                r#"button[aria-label="Stop generating"]"#.to_string(),
                r#"button[data-testid="stop-button"]"#.to_string(),
            ],
            complete_indicators: vec![
                r#"button[aria-label="Regenerate"]"#.to_string(),
                r#"button[data-testid="regenerate-button"]"#.to_string(),
                r#"button[aria-label="Copy"]"#.to_string(),
            ],
        }
    }
}

/// Browser session settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ChatSettings {
    /// WebDriver endpoint (chromedriver)
    pub webdriver_url: String,
    /// Started through `sh -c` before the session when set
    pub driver_command: Option<String>,
    pub chat_url: String,
    pub new_chat_url: String,
    /// Persistent browser profile; keeps the login between runs
    pub profile_dir: Option<PathBuf>,
    pub headless: bool,
    pub selectors: Selectors,
    pub navigation_timeout_secs: u64,
    pub response_timeout_secs: u64,
    pub post_send_delay_secs: u64,
    pub poll_interval_ms: u64,
    /// Identical reply snapshots needed to call a reply finished when no
    /// completion indicator shows up
    pub stable_polls: u32,
    /// How long `login` waits for the operator
    pub login_timeout_secs: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            driver_command: None,
            chat_url: "https://chat.openai.com".to_string(),
            new_chat_url: "https://chat.openai.com/?model=auto".to_string(),
            profile_dir: None,
            headless: false,
            selectors: Selectors::default(),
            navigation_timeout_secs: 30,
            response_timeout_secs: 180,
            post_send_delay_secs: 2,
            poll_interval_ms: 1000,
            stable_polls: 3,
            login_timeout_secs: 300,
        }
    }
}

impl ChatSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn post_send_delay(&self) -> Duration {
        Duration::from_secs(self.post_send_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Profile directory, defaulting under the user's data dir.
    pub fn resolved_profile_dir(&self) -> PathBuf {
        self.profile_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("verifybot")
                .join("browser-profile")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ChatSettings::default();
        assert_eq!(settings.selectors.prompt_input, "#prompt-textarea");
        assert_eq!(settings.selectors.send_buttons.len(), 4);
        assert_eq!(settings.response_timeout(), Duration::from_secs(180));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "headless: true\nselectors:\n  prompt-input: \"textarea#main\"\n";
        let settings: ChatSettings = serde_yaml::from_str(yaml).unwrap();
        assert!(settings.headless);
        assert_eq!(settings.selectors.prompt_input, "textarea#main");
        assert_eq!(settings.selectors.stop_buttons.len(), 2);
        assert_eq!(settings.navigation_timeout_secs, 30);
    }

    #[test]
    fn test_profile_dir_override() {
        let settings = ChatSettings {
            profile_dir: Some(PathBuf::from("/tmp/profile")),
            ..Default::default()
        };
        assert_eq!(settings.resolved_profile_dir(), PathBuf::from("/tmp/profile"));
    }
}
