//! TOML configuration for the artifact reader and the authenticator.
//!
//! This is deliberately narrow: it deserializes exactly the configured
//! parameters named in the component design (signature verification
//! policy and key paths, state script directory/version, the
//! authenticator's server list, tenant token, identity script path, and
//! crypto key material). Locating, merging, or watching configuration
//! files on disk is out of scope — [`load`] is a plain read-then-parse.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors arising from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML, or fails schema validation.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Signature verification policy for the artifact reader (§4.5 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySignature {
    /// Ignore any `manifest.sig` entry; accept the artifact unconditionally.
    Skip,
    /// Require the manifest signature to verify against a configured key.
    Verify,
}

impl Default for VerifySignature {
    fn default() -> Self {
        Self::Skip
    }
}

/// Configuration consumed by the artifact reader binary.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Whether to verify the detached manifest signature.
    #[serde(default)]
    pub verify_signature: VerifySignature,

    /// Paths to PEM-encoded public keys consulted during verification.
    /// Consulted in order; any one match is sufficient.
    #[serde(default)]
    pub signature_key_paths: Vec<PathBuf>,

    /// Directory state scripts are written to, with mode 0700.
    pub scripts_dir: PathBuf,

    /// Integer version stamped into the `version` file written alongside
    /// state scripts.
    pub scripts_version: i64,
}

impl AgentConfig {
    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if `text` is not valid TOML or does
    /// not match the expected schema.
    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if its contents are invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&text)
    }
}

/// Configuration consumed by the auth daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Servers tried in order on every fetch (§4.6).
    pub servers: Vec<String>,

    /// Optional opaque tenant scoping token included verbatim in requests.
    #[serde(default)]
    pub tenant_token: Option<String>,

    /// Path to the identity script executed before each fetch.
    pub identity_script_path: PathBuf,

    /// Path to the device's private key (PKCS#8 DER or PEM).
    pub private_key_path: PathBuf,

    /// Timeout in seconds for a full fetch attempt; defaults to 60.
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
}

const fn default_auth_timeout_secs() -> u64 {
    60
}

impl AuthConfig {
    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if `text` is not valid TOML or does
    /// not match the expected schema.
    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if its contents are invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&text)
    }

    /// The configured auth timeout as a [`Duration`].
    #[must_use]
    pub const fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn parses_minimal_agent_config() {
        let toml = r#"
            scripts_dir = "/var/lib/agent/scripts"
            scripts_version = 3
        "#;
        let cfg = AgentConfig::from_str(toml).expect("valid config");
        assert_eq!(cfg.verify_signature, VerifySignature::Skip);
        assert!(cfg.signature_key_paths.is_empty());
        assert_eq!(cfg.scripts_version, 3);
    }

    #[rstest]
    fn parses_verify_policy() {
        let toml = r#"
            verify_signature = "verify"
            signature_key_paths = ["/etc/agent/keys/a.pem"]
            scripts_dir = "/var/lib/agent/scripts"
            scripts_version = 1
        "#;
        let cfg = AgentConfig::from_str(toml).expect("valid config");
        assert_eq!(cfg.verify_signature, VerifySignature::Verify);
        assert_eq!(cfg.signature_key_paths.len(), 1);
    }

    #[rstest]
    fn rejects_malformed_toml() {
        let result = AgentConfig::from_str("not = [valid");
        assert!(result.is_err());
    }

    #[rstest]
    fn parses_auth_config_with_defaults() {
        let toml = r#"
            servers = ["https://a.example", "https://b.example"]
            identity_script_path = "/usr/share/agent/identity.sh"
            private_key_path = "/etc/agent/device.key"
        "#;
        let cfg = AuthConfig::from_str(toml).expect("valid config");
        assert_eq!(cfg.servers.len(), 2);
        assert_eq!(cfg.auth_timeout_secs, 60);
        assert!(cfg.tenant_token.is_none());
    }

    #[rstest]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            "scripts_dir = \"/var/lib/agent/scripts\"\nscripts_version = 1\n",
        )
        .expect("write config");
        let cfg = AgentConfig::load(&path).expect("load config");
        assert_eq!(cfg.scripts_version, 1);
    }

    #[rstest]
    fn load_reports_missing_file() {
        let missing = Path::new("/nonexistent/agent.toml");
        let err = AgentConfig::load(missing).expect_err("missing file is an error");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
