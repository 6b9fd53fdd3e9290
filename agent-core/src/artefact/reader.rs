//! Top-level artifact orchestration (C5).
//!
//! [`read_artifact`] drives the outer tar end to end in the strict order
//! the wire format requires: `version`, `manifest`, an optional
//! `manifest.sig`, `header.tar.gz`, then one `data/NNNN.tar.gz` per
//! declared payload. Every inner payload file streams through a
//! [`HashingReader`] bound to the digest its name declares in the
//! manifest, so a mismatch is detected the moment that file's body is
//! drained rather than buffered up front.
//!
//! The payload stage is callback-driven rather than a literal external
//! iterator: the `tar` crate's `Entries` borrows the `Archive` it was
//! created from, so an iterator type that outlives this function and is
//! handed back to an external caller would have to be self-referential.
//! A single pass that invokes `on_payload` as each inner entry is reached
//! gives the same ordering guarantees (previous payload's hash finalized
//! before the next begins, terminal on the first mismatch) without that
//! complication — the natural translation once the control flow is no
//! longer expressed as suspended callback chains (see the crate's design
//! notes on re-architecting callback-based async flows).

use std::io::{self, Read};

use flate2::read::GzDecoder;
use serde::Deserialize;

use super::error::{ArtefactError, Result};
use super::hashing_reader::HashingReader;
use super::header::{self, ParsedHeader, StateScriptWriter};
use super::manifest::Manifest;
use super::tar_reader::entry_name;
use super::types::{HeaderInfo, TypeInfo};
use super::verification::SignatureVerifyPolicy;

/// The only artifact format version this reader accepts (§1, §4.5 step 1).
const SUPPORTED_VERSION: i64 = 3;

#[derive(Debug, Deserialize)]
struct VersionDoc {
    #[allow(dead_code)]
    format: String,
    version: i64,
}

/// Everything known about an artifact once its header has been parsed,
/// before any payload bytes have been streamed.
#[derive(Debug, Clone)]
pub struct ArtifactSummary {
    /// The `header-info` document.
    pub header_info: HeaderInfo,
    /// The sole supported payload's `type-info` document.
    pub type_info: TypeInfo,
    /// The sole supported payload's `meta-data` document.
    pub meta_data: serde_json::Value,
    /// Number of distinct entries the manifest declared.
    pub manifest_entry_count: usize,
}

impl ArtifactSummary {
    /// Merge `{artifact_name}`, `{artifact_group}` (if present), and
    /// `type_info.artifact_provides` into a single provenance map (§4.7).
    #[must_use]
    pub fn get_provides(&self) -> std::collections::HashMap<String, String> {
        let mut provides = std::collections::HashMap::new();
        provides.insert(
            "artifact_name".to_owned(),
            self.header_info.provides.artifact_name.clone(),
        );
        if let Some(group) = &self.header_info.provides.artifact_group {
            provides.insert("artifact_group".to_owned(), group.clone());
        }
        if let Some(extra) = &self.type_info.artifact_provides {
            for (k, v) in extra {
                provides.insert(k.clone(), v.clone());
            }
        }
        provides
    }

    /// Build the `device_type`/`artifact_name`/`artifact_group`/
    /// `type_info.artifact_depends` dependency map (§4.7).
    #[must_use]
    pub fn get_depends(&self) -> std::collections::HashMap<String, Vec<String>> {
        let mut depends = std::collections::HashMap::new();
        depends.insert(
            "device_type".to_owned(),
            self.header_info.depends.device_type.clone(),
        );
        if let Some(name) = &self.header_info.depends.artifact_name {
            depends.insert("artifact_name".to_owned(), vec![name.clone()]);
        }
        if let Some(group) = &self.header_info.depends.artifact_group {
            depends.insert("artifact_group".to_owned(), vec![group.clone()]);
        }
        if let Some(extra) = &self.type_info.artifact_depends {
            for (k, v) in extra {
                depends.insert(k.clone(), vec![v.clone()]);
            }
        }
        depends
    }
}

/// Read and verify the artifact in `reader`, invoking `on_payload` for
/// every file inside every `data/NNNN.tar.gz`, in archive order.
///
/// `on_payload` receives the zero-based payload index, the file's name as
/// it appears inside that payload's inner tar, and a `body` handle whose
/// bytes are hashed against the manifest as they are read. Any bytes
/// `on_payload` leaves unread are drained automatically before the next
/// file is reached, so the checksum check always runs to completion.
///
/// # Errors
///
/// Returns [`ArtefactError::Structural`] for any entry out of the
/// required order, a missing required entry, or an unsupported version;
/// [`ArtefactError::Parse`] for malformed JSON or a malformed manifest
/// line; [`ArtefactError::Setup`] or [`ArtefactError::Signature`] from
/// signature verification (see [`SignatureVerifyPolicy::check`]); and
/// [`ArtefactError::ChecksumMismatch`] the moment a payload file's bytes
/// are fully drained and do not match its declared digest. Once any of
/// these is returned, the artifact must not be read further.
pub fn read_artifact<R: Read>(
    reader: R,
    policy: &SignatureVerifyPolicy,
    scripts: &dyn StateScriptWriter,
    scripts_version: i64,
    mut on_payload: impl FnMut(usize, &str, &mut dyn Read) -> Result<()>,
) -> Result<ArtifactSummary> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = archive.entries().map_err(ArtefactError::from)?;

    let version_doc: VersionDoc = {
        let mut entry = next_named_entry(&mut entries, "version")?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).map_err(ArtefactError::from)?;
        serde_json::from_slice(&bytes).map_err(|e| ArtefactError::Parse {
            reason: format!("malformed version JSON: {e}"),
        })?
    };
    if version_doc.version != SUPPORTED_VERSION {
        return Err(ArtefactError::Structural {
            reason: format!(
                "unsupported artifact version {}, expected {SUPPORTED_VERSION}",
                version_doc.version
            ),
        });
    }

    let manifest_bytes = {
        let mut entry = next_named_entry(&mut entries, "manifest")?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).map_err(ArtefactError::from)?;
        bytes
    };
    let manifest = Manifest::parse(manifest_bytes.as_slice())?;

    let mut next = entries
        .next()
        .ok_or_else(|| ArtefactError::Structural {
            reason: "artifact ended before header.tar.gz".to_owned(),
        })?
        .map_err(ArtefactError::from)?;
    let mut next_name = entry_name(&next)?;

    let signature = if next_name == "manifest.sig" {
        let mut bytes = Vec::new();
        next.read_to_end(&mut bytes).map_err(ArtefactError::from)?;
        next = entries
            .next()
            .ok_or_else(|| ArtefactError::Structural {
                reason: "artifact ended before header.tar.gz".to_owned(),
            })?
            .map_err(ArtefactError::from)?;
        next_name = entry_name(&next)?;
        Some(bytes)
    } else {
        None
    };
    policy.check(&manifest_bytes, signature.as_deref())?;

    if next_name != "header.tar.gz" {
        return Err(ArtefactError::Structural {
            reason: format!("expected header.tar.gz, found {next_name}"),
        });
    }
    let ParsedHeader {
        header_info,
        type_info,
        meta_data,
    } = header::parse_header(GzDecoder::new(next), scripts, scripts_version)?;

    for index in 0..header_info.payloads.len() {
        let expected_name = format!("data/{index:04}.tar.gz");
        let mut entry = next_named_entry(&mut entries, &expected_name)?;
        let mut inner = tar::Archive::new(GzDecoder::new(&mut entry));
        let mut inner_entries = inner.entries().map_err(ArtefactError::from)?;
        while let Some(inner_entry) = inner_entries.next() {
            let mut inner_entry = inner_entry.map_err(ArtefactError::from)?;
            let filename = entry_name(&inner_entry)?;
            let digest = manifest.digest_for(&filename).ok_or_else(|| ArtefactError::Structural {
                reason: format!("payload file {filename} has no manifest entry"),
            })?;
            let mut hashing =
                HashingReader::with_expected_hex(&mut inner_entry, digest.to_string());
            on_payload(index, &filename, &mut hashing)?;
            io::copy(&mut hashing, &mut io::sink()).map_err(ArtefactError::from)?;
        }
    }

    if entries.next().is_some() {
        return Err(ArtefactError::Structural {
            reason: "unexpected trailing entry after the declared payloads".to_owned(),
        });
    }

    Ok(ArtifactSummary {
        header_info,
        type_info,
        meta_data,
        manifest_entry_count: manifest.len(),
    })
}

fn next_named_entry<'a, R: Read>(
    entries: &mut tar::Entries<'a, R>,
    expected: &str,
) -> Result<tar::Entry<'a, R>> {
    let entry = entries
        .next()
        .ok_or_else(|| ArtefactError::Structural {
            reason: format!("artifact ended before expected entry {expected}"),
        })?
        .map_err(ArtefactError::from)?;
    let name = entry_name(&entry)?;
    if name != expected {
        return Err(ArtefactError::Structural {
            reason: format!("expected {expected}, found {name}"),
        });
    }
    Ok(entry)
}
