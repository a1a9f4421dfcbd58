//! Chat sessions.
//!
//! A session holds one conversation at a time. `prompt` starts a fresh
//! conversation; `followup` continues the current one, so feedback can
//! refer to code the assistant already wrote.

pub mod fences;
pub mod selectors;
pub mod webdriver;

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, VerifyError};

pub use fences::reconstruct_fences;
pub use selectors::{ChatSettings, Selectors};
pub use webdriver::WebDriverChat;

/// A conversation with a chat assistant.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Start a new conversation with `text` and return the full reply.
    async fn prompt(&self, text: &str) -> Result<String>;

    /// Send `text` in the current conversation and return the full reply.
    async fn followup(&self, text: &str) -> Result<String>;

    /// Release the session.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Which call carried a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    Prompt,
    Followup,
}

/// Replays canned replies in order. Used by tests and `--replay` runs.
#[derive(Debug, Default)]
pub struct ScriptedChat {
    replies: Mutex<VecDeque<String>>,
    sent: Mutex<Vec<(Turn, String)>>,
}

impl ScriptedChat {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// One reply per file, in the order given.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut replies = Vec::with_capacity(paths.len());
        for path in paths {
            replies.push(std::fs::read_to_string(path)?);
        }
        Ok(Self::new(replies))
    }

    /// Every message sent so far.
    pub fn sent(&self) -> Vec<(Turn, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn reply(&self, turn: Turn, text: &str) -> Result<String> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((turn, text.to_string()));
        }
        self.replies
            .lock()
            .map_err(|_| VerifyError::Chat("scripted chat lock poisoned".to_string()))?
            .pop_front()
            .ok_or_else(|| VerifyError::Chat("no scripted replies left".to_string()))
    }
}

#[async_trait]
impl ChatSession for ScriptedChat {
    async fn prompt(&self, text: &str) -> Result<String> {
        self.reply(Turn::Prompt, text)
    }

    async fn followup(&self, text: &str) -> Result<String> {
        self.reply(Turn::Followup, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_scripted_chat_replays_in_order() {
        let chat = ScriptedChat::new(["first", "second"]);
        assert_eq!(chat.prompt("hi").await.unwrap(), "first");
        assert_eq!(chat.followup("again").await.unwrap(), "second");
        assert!(matches!(chat.followup("more").await, Err(VerifyError::Chat(_))));

        let sent = chat.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], (Turn::Prompt, "hi".to_string()));
        assert_eq!(sent[1].0, Turn::Followup);
    }

    #[test]
    fn test_from_files() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.md");
        let b = dir.path().join("b.md");
        std::fs::write(&a, "reply a").unwrap();
        std::fs::write(&b, "reply b").unwrap();
        let chat = ScriptedChat::from_files(&[a, b]).unwrap();
        assert_eq!(chat.remaining(), 2);
    }
}
