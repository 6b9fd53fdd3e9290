//! Shared ambient infrastructure for the update agent and the auth daemon.
//!
//! This crate holds the parts of the stack that are genuinely common to
//! both binaries but are not part of either subsystem's core logic:
//! logging initialization, the small TOML configuration layer, and the
//! device signing/verification primitives consumed by both the artifact
//! reader (signature verification) and the authenticator (request
//! signing).
//!
//! # Modules
//!
//! - [`logging`] — global logger initialization.
//! - [`config`] — TOML-backed configuration structs.
//! - [`crypto`] — signing and verification trait seams plus a `ring`-based
//!   implementation.

pub mod config;
pub mod crypto;
pub mod logging;
