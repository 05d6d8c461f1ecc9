//! Credential acquisition.
//!
//! One OAuth access token is minted per run by shelling out to the gcloud
//! CLI, which owns the application-default credential chain. The token is
//! held in memory for the duration of the run and never logged.

use crate::error::{Error, Result};
use std::fmt;
use std::process::Command;

#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    /// Mint a token via `gcloud auth print-access-token`. A missing gcloud
    /// binary or a failing invocation is a run-fatal connectivity problem.
    pub fn from_gcloud() -> Result<AccessToken> {
        which::which("gcloud").map_err(|_| Error::GcloudMissing)?;

        let output = Command::new("gcloud")
            .args(["auth", "print-access-token"])
            .output()
            .map_err(|e| Error::Connectivity {
                target: "gcloud".to_string(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Connectivity {
                target: "gcloud".to_string(),
                detail: stderr.trim().chars().take(300).collect(),
            });
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(Error::Connectivity {
                target: "gcloud".to_string(),
                detail: "empty access token".to_string(),
            });
        }
        Ok(AccessToken(token))
    }

    /// Wrap an existing token (tests, service environments).
    pub fn new(token: impl Into<String>) -> AccessToken {
        AccessToken(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

// Keep the token out of debug output and error chains.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(…)")
    }
}
