//! Error types for the streaming artifact reader.
//!
//! Variants mirror the error-kind taxonomy the reader is contractually
//! bound to: malformed input produces [`ArtefactError::Parse`] or
//! [`ArtefactError::Structural`] depending on whether the problem is within
//! an entry's content or the entry sequence itself, a failed digest
//! comparison is always [`ArtefactError::ChecksumMismatch`], and signature
//! policy failures split into [`ArtefactError::Setup`] (no applicable key
//! configured at all) and [`ArtefactError::Signature`] (keys configured,
//! none matched).

use thiserror::Error;

/// Errors arising from parsing or verifying an artifact.
#[derive(Debug, Error)]
pub enum ArtefactError {
    /// An entry's content did not match its expected grammar (a manifest
    /// line, a JSON document, a hex digest).
    #[error("parse error: {reason}")]
    Parse {
        /// Description of what failed to parse and why.
        reason: String,
    },

    /// A Hashing Reader's computed digest did not match the digest it was
    /// constructed to expect.
    #[error("checksum mismatch: expected {expected}, calculated {calculated}")]
    ChecksumMismatch {
        /// The digest the reader was told to expect.
        expected: String,
        /// The digest actually computed from the bytes read.
        calculated: String,
    },

    /// A signature was present and checked against at least one configured
    /// key, but none of them verified it.
    #[error("signature verification failed: {reason}")]
    Signature {
        /// Additional context, if available.
        reason: String,
    },

    /// The entry sequence itself was wrong: a required entry was absent,
    /// an entry appeared out of order, or an unsupported format version
    /// was declared.
    #[error("structural error: {reason}")]
    Structural {
        /// Description of the structural violation.
        reason: String,
    },

    /// The caller's configuration makes the requested operation
    /// impossible regardless of the artifact's contents (e.g. signature
    /// verification requested with no keys configured).
    #[error("setup error: {reason}")]
    Setup {
        /// Description of the configuration problem.
        reason: String,
    },

    /// An internal invariant was violated. Constructed from a
    /// `debug_assert!`-guarded path rather than reached by `panic!`, so a
    /// release build surfaces this instead of aborting.
    #[error("internal invariant violated: {reason}")]
    Programming {
        /// Description of the violated invariant.
        reason: String,
    },

    /// An I/O error propagated from the wrapped byte source.
    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

impl Clone for ArtefactError {
    fn clone(&self) -> Self {
        match self {
            Self::Parse { reason } => Self::Parse {
                reason: reason.clone(),
            },
            Self::ChecksumMismatch {
                expected,
                calculated,
            } => Self::ChecksumMismatch {
                expected: expected.clone(),
                calculated: calculated.clone(),
            },
            Self::Signature { reason } => Self::Signature {
                reason: reason.clone(),
            },
            Self::Structural { reason } => Self::Structural {
                reason: reason.clone(),
            },
            Self::Setup { reason } => Self::Setup {
                reason: reason.clone(),
            },
            Self::Programming { reason } => Self::Programming {
                reason: reason.clone(),
            },
            Self::Io(err) => Self::Io(std::io::Error::new(err.kind(), err.to_string())),
        }
    }
}

impl From<std::io::Error> for ArtefactError {
    fn from(err: std::io::Error) -> Self {
        match err.downcast::<ArtefactError>() {
            Ok(inner) => *inner,
            Err(err) => Self::Io(err),
        }
    }
}

/// Result type alias using [`ArtefactError`].
pub type Result<T> = std::result::Result<T, ArtefactError>;
