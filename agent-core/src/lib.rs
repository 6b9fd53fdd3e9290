//! Streaming artifact reader: tar-in-tar parsing, hash verification, and
//! manifest/header parsing for the update agent.
//!
//! This crate implements C1–C5 of the artifact reader subsystem: a
//! hashing byte-source wrapper, a lazy forward-only tar entry sequence, a
//! plaintext manifest parser, a strict-ordering inner header tar walk,
//! and the top-level orchestration that ties them together over the
//! outer artifact tar. See [`artefact`] for the full module breakdown.
//!
//! # Modules
//!
//! - [`artefact`] — the artifact reader stack (C1–C5).
//! - [`error`] — the `agent` CLI binary's top-level error type.

pub mod artefact;
pub mod error;
