//! Streaming parser and verifier for the artifact wire format (C1–C5).
//!
//! The on-wire layout is an outer, uncompressed ustar archive carrying, in
//! strict order: `version`, `manifest`, an optional `manifest.sig`,
//! `header.tar.gz`, then one `data/NNNN.tar.gz` per declared payload. Every
//! byte of every payload is hashed as it streams through, never buffered
//! whole, and checked against the digest the manifest declared for it.
//!
//! # Sub-modules
//!
//! - [`error`] — the artifact error kind taxonomy.
//! - [`digest`] — the `Digest` newtype shared by the manifest and hashing
//!   reader (C1 support).
//! - [`hashing_reader`] — streaming SHA-256 verification (C1).
//! - [`tar_reader`] — tar entry name normalization (C2 support; sequencing
//!   itself is the `tar` crate's own forward-only `Entries` iterator).
//! - [`manifest`] — plaintext manifest parsing (C3).
//! - [`types`] — `header-info`/`type-info`/`meta-data` JSON schema (C4
//!   support).
//! - [`header`] — the inner header tar walk (C4).
//! - [`verification`] — detached manifest signature policy (§4.5 step 5).
//! - [`reader`] — the top-level orchestration and payload streaming (C5).

pub mod digest;
pub mod error;
pub mod hashing_reader;
pub mod header;
pub mod manifest;
pub mod reader;
pub mod tar_reader;
pub mod types;
pub mod verification;
