//! ID generation utilities for VerifyBot
//!
//! Run ids combine a wall-clock stamp with a short digest of the prompt so
//! transcripts for the same task sort together but never collide.

use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};

/// Short hex digest of arbitrary text (first 4 bytes of SHA-256).
pub fn short_digest(text: &str) -> String {
    let hash = Sha256::digest(text.as_bytes());
    hex::encode(&hash[..4])
}

/// Generate a run ID for a prompt at a given time.
///
/// Format: `{YYYYmmdd_HHMMSS}-{digest}`
/// Example: `20260117_142301-9f86d081`
pub fn run_id_at(prompt: &str, at: DateTime<Local>) -> String {
    format!("{}-{}", at.format("%Y%m%d_%H%M%S"), short_digest(prompt))
}

/// Generate a run ID for a prompt now.
pub fn generate_run_id(prompt: &str) -> String {
    run_id_at(prompt, Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_short_digest_is_stable() {
        assert_eq!(short_digest("test"), "9f86d081");
        assert_eq!(short_digest("test"), short_digest("test"));
        assert_ne!(short_digest("a"), short_digest("b"));
    }

    #[test]
    fn test_run_id_format() {
        let at = Local.with_ymd_and_hms(2026, 1, 17, 14, 23, 1).unwrap();
        let id = run_id_at("test", at);
        assert_eq!(id, "20260117_142301-9f86d081");
    }

    #[test]
    fn test_generate_run_id_has_two_parts() {
        let id = generate_run_id("write a fizzbuzz");
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
