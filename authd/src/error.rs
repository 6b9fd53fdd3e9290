//! Error taxonomy for the authentication daemon (§7).

use std::path::PathBuf;

use thiserror::Error;

use agent_common::config::ConfigError;
use agent_common::crypto::CryptoError;

/// Errors the authenticator state machine and its collaborators produce.
///
/// Every variant carries only owned, `String`-based data so a single fetch
/// outcome can be dispatched to every pending caller by cloning the
/// `Result` itself, without needing the lower-level I/O or crypto errors
/// that produced it to be `Clone` (§5: "every pending action gets exactly
/// one callback"). Per-server failures (unauthorized, API error, transport
/// failure) are recovered locally by the fetch loop and never reach this
/// type; only the terminal outcomes do.
#[derive(Debug, Clone, Error)]
pub enum AuthdError {
    /// The identity script could not be run, exited non-zero, or timed out.
    #[error("identity script failed: {reason}")]
    Identity {
        /// Human-readable cause.
        reason: String,
    },

    /// Every configured server was exhausted, or the fetch timed out.
    #[error("authentication failed: {reason}")]
    Authentication {
        /// Human-readable cause.
        reason: String,
    },

    /// An internal invariant was violated.
    #[error("internal invariant violated: {reason}")]
    Programming {
        /// Human-readable cause.
        reason: String,
    },
}

/// Result type alias using [`AuthdError`].
pub type Result<T> = std::result::Result<T, AuthdError>;

/// Errors the `authd` binary's entrypoint can report.
///
/// Unlike [`AuthdError`], these never cross the actor's reply channel, so
/// they are free to wrap non-`Clone` lower-level errors directly.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Loading configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Loading or parsing the device key failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The authenticator reported an error.
    #[error(transparent)]
    Authenticator(#[from] AuthdError),

    /// A configured file could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        /// Path that could not be opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the `authd` binary.
pub type DaemonResult<T> = std::result::Result<T, DaemonError>;
