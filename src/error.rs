//! Error types for VerifyBot
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in VerifyBot
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Invalid or inconsistent configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Credential file missing or incomplete
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Chat session (browser automation) failure
    #[error("Chat error: {0}")]
    Chat(String),

    /// No usable code in a chat response
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Remote upload/run/download failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Local process could not be started or supervised
    #[error("Process error: {0}")]
    Process(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML config parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP error talking to the WebDriver endpoint
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl VerifyError {
    /// Errors that mean no remote channel was available.
    pub fn is_transport(&self) -> bool {
        matches!(self, VerifyError::Transport(_) | VerifyError::Credentials(_))
    }
}

/// Result type alias for VerifyBot operations
pub type Result<T> = std::result::Result<T, VerifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = VerifyError::Config("max_retries must be > 0".to_string());
        assert_eq!(err.to_string(), "Config error: max_retries must be > 0");
    }

    #[test]
    fn test_credentials_error() {
        let err = VerifyError::Credentials("PI_HOST missing".to_string());
        assert_eq!(err.to_string(), "Credentials error: PI_HOST missing");
        assert!(err.is_transport());
    }

    #[test]
    fn test_transport_error() {
        let err = VerifyError::Transport("auth failed".to_string());
        assert_eq!(err.to_string(), "Transport error: auth failed");
        assert!(err.is_transport());
    }

    #[test]
    fn test_chat_error_is_not_transport() {
        let err = VerifyError::Chat("send button not found".to_string());
        assert!(!err.is_transport());
    }

    #[test]
    fn test_extraction_error() {
        let err = VerifyError::Extraction("no code blocks".to_string());
        assert_eq!(err.to_string(), "Extraction error: no code blocks");
        assert!(!err.is_transport());
    }

    #[test]
    fn test_invalid_state_error() {
        let err = VerifyError::InvalidState("no attempts recorded".to_string());
        assert_eq!(err.to_string(), "Invalid state: no attempts recorded");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VerifyError = io_err.into();
        assert!(matches!(err, VerifyError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: VerifyError = json_err.into();
        assert!(matches!(err, VerifyError::Json(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<Vec<u32>>("{not: a list").unwrap_err();
        let err: VerifyError = yaml_err.into();
        assert!(matches!(err, VerifyError::Yaml(_)));
    }
}
