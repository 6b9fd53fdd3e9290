//! Identity script execution (§4.6 step 1, §6).
//!
//! The identity script is an external, device-specific executable whose
//! stdout is a sequence of `key=value` lines; this module runs it and
//! turns that output into the stable, sorted-key JSON string the auth
//! request body carries. Modeled as a [`CommandRunner`] trait so the
//! fetch algorithm can be tested without spawning a real process, the
//! same seam this codebase puts between a subsystem and the external
//! tool it shells out to.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::error::AuthdError;

/// Runs the identity script and returns its raw stdout.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Execute `script`, returning its stdout as text.
    ///
    /// # Errors
    ///
    /// Returns [`AuthdError::Identity`] if the script cannot be started,
    /// exits non-zero, or does not finish within the runner's configured
    /// timeout.
    fn run(&self, script: &Path) -> Result<String, AuthdError>;
}

/// Production [`CommandRunner`]: shells out via [`std::process::Command`],
/// bounded by `wait-timeout` so a hung identity script cannot stall a
/// fetch indefinitely.
pub struct ProcessCommandRunner {
    timeout: Duration,
}

impl ProcessCommandRunner {
    /// Build a runner that kills the script if it outlives `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, script: &Path) -> Result<String, AuthdError> {
        let mut child = Command::new(script)
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| AuthdError::Identity {
                reason: format!("failed to start {}: {e}", script.display()),
            })?;

        let status = child
            .wait_timeout(self.timeout)
            .map_err(|e| AuthdError::Identity {
                reason: format!("failed to wait for {}: {e}", script.display()),
            })?;

        match status {
            Some(status) if status.success() => {
                let mut stdout = child.stdout.take().ok_or_else(|| AuthdError::Programming {
                    reason: "identity script stdout pipe missing".to_owned(),
                })?;
                let mut out = String::new();
                stdout
                    .read_to_string(&mut out)
                    .map_err(|e| AuthdError::Identity {
                        reason: format!("failed to read identity script output: {e}"),
                    })?;
                Ok(out)
            }
            Some(status) => Err(AuthdError::Identity {
                reason: format!("identity script {} exited with {status}", script.display()),
            }),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(AuthdError::Identity {
                    reason: format!(
                        "identity script {} timed out after {:?}",
                        script.display(),
                        self.timeout
                    ),
                })
            }
        }
    }
}

/// Turn identity-script stdout into the stable JSON form the auth request
/// carries (§4.6 step 1): duplicate `key=value` lines become a JSON array
/// under that key, and `serde_json`'s default (non-`preserve_order`) map
/// keeps keys sorted, giving a single stable string form for free.
#[must_use]
pub fn parse_identity_data(raw: &str) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_owned();
        let value = serde_json::Value::String(value.trim().to_owned());
        match map.remove(&key) {
            None => {
                map.insert(key, value);
            }
            Some(serde_json::Value::Array(mut values)) => {
                values.push(value);
                map.insert(key, serde_json::Value::Array(values));
            }
            Some(existing) => {
                map.insert(key, serde_json::Value::Array(vec![existing, value]));
            }
        }
    }
    serde_json::Value::Object(map)
}
