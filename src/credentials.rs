//! SSH credentials for the Raspberry Pi, read from a `.env` style file.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, VerifyError};

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Connection details for the remote primary host.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub user: String,
    /// `None` means key-based auth
    pub password: Option<String>,
    pub port: u16,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("port", &self.port)
            .finish()
    }
}

impl Credentials {
    /// Load `PI_HOST`, `PI_USER`, `PI_PASSWORD` and optional `PI_PORT`.
    ///
    /// The process environment is never consulted or modified.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VerifyError::Credentials(format!(
                "credential file {} not found (expected PI_HOST, PI_USER, PI_PASSWORD)",
                path.display()
            )));
        }
        let iter = dotenvy::from_path_iter(path).map_err(|e| {
            VerifyError::Credentials(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                VerifyError::Credentials(format!("malformed line in {}: {}", path.display(), e))
            })?;
            values.insert(key, value);
        }
        Self::from_map(&values, path)
    }

    fn from_map(values: &HashMap<String, String>, path: &Path) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            values
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    VerifyError::Credentials(format!("{} missing from {}", key, path.display()))
                })
        };

        let port = match values.get("PI_PORT").map(|p| p.trim()) {
            None | Some("") => DEFAULT_SSH_PORT,
            Some(raw) => raw.parse().map_err(|_| {
                VerifyError::Credentials(format!("PI_PORT '{}' is not a valid port", raw))
            })?,
        };

        Ok(Self {
            host: required("PI_HOST")?,
            user: required("PI_USER")?,
            password: values
                .get("PI_PASSWORD")
                .map(|p| p.to_string())
                .filter(|p| !p.is_empty()),
            port,
        })
    }

    /// `user@host` as ssh expects it.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}
