//! Top-level error type for the `agent` CLI binary.
//!
//! Library code below this layer returns the narrower
//! [`crate::artefact::error::ArtefactError`] and
//! [`agent_common::config::ConfigError`]; this type exists only to give the
//! binary entrypoint a single `Result` to propagate with `?`.

use std::path::PathBuf;

use thiserror::Error;

use crate::artefact::error::ArtefactError;
use agent_common::config::ConfigError;

/// Errors the `agent` binary can report.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Parsing or verifying the artifact failed.
    #[error(transparent)]
    Artefact(#[from] ArtefactError),

    /// Loading configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The artifact file named on the command line could not be opened.
    #[error("failed to open artifact file {path}: {source}")]
    Open {
        /// Path that could not be opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using [`AgentError`].
pub type Result<T> = std::result::Result<T, AgentError>;
