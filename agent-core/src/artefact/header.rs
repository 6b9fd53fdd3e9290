//! Header parsing (C4): the strict-ordering walk over the inner,
//! gzip-compressed tar that carries `header-info`, optional state scripts,
//! and the per-payload `type-info`/`meta-data` sub-headers.
//!
//! Entries must appear in exactly this order: `header-info`; zero or more
//! `scripts/<name>`; then, per payload index starting at `0000`,
//! `headers/NNNN/type-info` and an optional `headers/NNNN/meta-data`. The
//! current scope restriction (see the crate's design notes) supports only
//! a single payload's sub-header — a second `type-info` entry at any index
//! is rejected with `"Multiple header entries found"`, matching the
//! upstream parser this component is bug-compatible with.

use std::io::Read;

use super::error::{ArtefactError, Result};
use super::tar_reader::entry_name;
use super::types::{self, HeaderInfo, TypeInfo};

/// Writes a state script to persistent storage.
///
/// Abstracts the filesystem so the header walk can be tested without
/// touching disk.
#[cfg_attr(test, mockall::automock)]
pub trait StateScriptWriter {
    /// Write `contents` as the script named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::Io`] if the script cannot be written.
    fn write_script(&self, name: &str, contents: &[u8]) -> Result<()>;

    /// Record `version` as the configured version stamp, and fsync the
    /// scripts directory. Called once, after all scripts for this header
    /// have been written, and only if at least one script was written.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::Io`] if the version file cannot be written
    /// or the directory cannot be synced.
    fn finalize(&self, version: i64) -> Result<()>;
}

/// Writes state scripts to a configured directory on disk, mode 0700.
pub struct FsStateScriptWriter {
    dir: std::path::PathBuf,
}

impl FsStateScriptWriter {
    /// Target `dir` for scripts; created with mode 0700 if absent.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::Io`] if the directory cannot be created or
    /// its permissions cannot be set.
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(ArtefactError::from)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .map_err(ArtefactError::from)?;
        }
        Ok(Self { dir })
    }
}

impl StateScriptWriter for FsStateScriptWriter {
    fn write_script(&self, name: &str, contents: &[u8]) -> Result<()> {
        let path = self.dir.join(name);
        std::fs::write(&path, contents).map_err(ArtefactError::from)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700))
                .map_err(ArtefactError::from)?;
        }
        Ok(())
    }

    fn finalize(&self, version: i64) -> Result<()> {
        std::fs::write(self.dir.join("version"), version.to_string()).map_err(ArtefactError::from)?;
        #[cfg(unix)]
        {
            let dir = std::fs::File::open(&self.dir).map_err(ArtefactError::from)?;
            dir.sync_all().map_err(ArtefactError::from)?;
        }
        Ok(())
    }
}

/// Parsed contents of the inner header tar: the top-level declaration plus
/// the single supported payload's sub-header.
#[derive(Debug, Clone)]
pub struct ParsedHeader {
    /// The `header-info` document.
    pub header_info: HeaderInfo,
    /// The sole supported payload's `type-info` document, after the
    /// `rootfs-image` bug-compat rewrite has been applied.
    pub type_info: TypeInfo,
    /// The sole supported payload's `meta-data` document (`Value::Null`
    /// if absent or its body was empty).
    pub meta_data: serde_json::Value,
}

/// Walk the inner header tar read from `reader`, writing any state scripts
/// via `scripts` and stamping `scripts_version` once scripts have been
/// written.
///
/// # Errors
///
/// Returns [`ArtefactError::Structural`] if an entry appears out of order
/// or a required entry is missing, [`ArtefactError::Parse`] if a JSON
/// entry is malformed, and [`ArtefactError::Io`] for I/O failures
/// underlying the tar stream or script writes.
pub fn parse_header<R: Read>(
    reader: R,
    scripts: &dyn StateScriptWriter,
    scripts_version: i64,
) -> Result<ParsedHeader> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = archive.entries().map_err(ArtefactError::from)?;

    let header_info = {
        let mut entry = entries
            .next()
            .ok_or_else(|| ArtefactError::Structural {
                reason: "header tar is empty, expected header-info first".to_owned(),
            })?
            .map_err(ArtefactError::from)?;
        let name = entry_name(&entry)?;
        if name != "header-info" {
            return Err(ArtefactError::Structural {
                reason: format!("expected header-info first, found {name}"),
            });
        }
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).map_err(ArtefactError::from)?;
        let header_info =
            serde_json::from_slice::<HeaderInfo>(&bytes).map_err(|e| ArtefactError::Parse {
                reason: format!("malformed header-info JSON: {e}"),
            })?;
        validate_header_info(&header_info)?;
        header_info
    };

    let mut scripts_written = false;
    let mut pending: Option<(String, tar::Entry<'_, R>)> = None;

    loop {
        let mut entry = match entries.next() {
            Some(entry) => entry.map_err(ArtefactError::from)?,
            None => break,
        };
        let name = entry_name(&entry)?;
        if let Some(script_name) = name.strip_prefix("scripts/") {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).map_err(ArtefactError::from)?;
            scripts.write_script(script_name, &bytes)?;
            scripts_written = true;
            continue;
        }
        pending = Some((name, entry));
        break;
    }

    if scripts_written {
        scripts.finalize(scripts_version)?;
    }

    let Some((name, mut entry)) = pending else {
        return Err(ArtefactError::Structural {
            reason: "header tar has no payload sub-header".to_owned(),
        });
    };

    if name != "headers/0000/type-info" {
        if name.starts_with("headers/") && name.ends_with("/type-info") {
            return Err(ArtefactError::Parse {
                reason: "Multiple header entries found".to_owned(),
            });
        }
        return Err(ArtefactError::Structural {
            reason: format!("expected headers/0000/type-info, found {name}"),
        });
    }

    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).map_err(ArtefactError::from)?;
    let mut type_info = types::parse_type_info(&bytes)?;

    if let Some(first) = header_info.payloads.first() {
        if first.type_name == "rootfs-image" && type_info.type_name == "null" {
            type_info.type_name = "rootfs-image".to_owned();
        }
    }

    let mut meta_data = serde_json::Value::Null;
    match entries.next() {
        None => {}
        Some(entry) => {
            let mut entry = entry.map_err(ArtefactError::from)?;
            let name = entry_name(&entry)?;
            if name == "headers/0000/meta-data" {
                let mut bytes = Vec::new();
                entry.read_to_end(&mut bytes).map_err(ArtefactError::from)?;
                meta_data = types::parse_meta_data(&bytes)?;
            } else if name.starts_with("headers/") && name.ends_with("/type-info") {
                return Err(ArtefactError::Parse {
                    reason: "Multiple header entries found".to_owned(),
                });
            } else {
                return Err(ArtefactError::Structural {
                    reason: format!("unexpected entry after type-info: {name}"),
                });
            }
        }
    }

    if let Some(next) = entries.next() {
        let entry = next.map_err(ArtefactError::from)?;
        let name = entry_name(&entry)?;
        if name.starts_with("headers/") && name.ends_with("/type-info") {
            return Err(ArtefactError::Parse {
                reason: "Multiple header entries found".to_owned(),
            });
        }
        return Err(ArtefactError::Structural {
            reason: format!("unexpected trailing header entry: {name}"),
        });
    }

    Ok(ParsedHeader {
        header_info,
        type_info,
        meta_data,
    })
}

/// Enforce the `header-info` invariants spec.md §3 requires: at least one
/// declared payload, and a non-empty `device_type` dependency list.
///
/// # Errors
///
/// Returns [`ArtefactError::Structural`] if either invariant is violated.
fn validate_header_info(header_info: &HeaderInfo) -> Result<()> {
    if header_info.payloads.is_empty() {
        return Err(ArtefactError::Structural {
            reason: "header-info declares no payloads".to_owned(),
        });
    }
    if header_info.depends.device_type.is_empty() {
        return Err(ArtefactError::Structural {
            reason: "header-info depends.device_type must be non-empty".to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::cell::RefCell;

    fn append(builder: &mut tar::Builder<Vec<u8>>, name: &str, contents: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, contents).expect("append entry");
    }

    #[derive(Default)]
    struct RecordingScripts {
        written: RefCell<Vec<(String, Vec<u8>)>>,
        finalized_version: RefCell<Option<i64>>,
    }

    impl StateScriptWriter for RecordingScripts {
        fn write_script(&self, name: &str, contents: &[u8]) -> Result<()> {
            self.written
                .borrow_mut()
                .push((name.to_owned(), contents.to_vec()));
            Ok(())
        }

        fn finalize(&self, version: i64) -> Result<()> {
            *self.finalized_version.borrow_mut() = Some(version);
            Ok(())
        }
    }

    const HEADER_INFO: &[u8] =
        br#"{"payloads":[{"name":"rootfs.ext4","type":"rootfs-image"}],"provides":{"artifact_name":"r7"},"depends":{"device_type":["qemux86-64"]}}"#;

    #[rstest]
    fn parses_minimal_header_with_no_scripts_or_metadata() {
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "header-info", HEADER_INFO);
        append(&mut builder, "headers/0000/type-info", br#"{"type":"rootfs-image"}"#);
        let bytes = builder.into_inner().expect("finish");

        let scripts = RecordingScripts::default();
        let parsed =
            parse_header(std::io::Cursor::new(bytes), &scripts, 1).expect("valid header");
        assert_eq!(parsed.type_info.type_name, "rootfs-image");
        assert_eq!(parsed.meta_data, serde_json::Value::Null);
        assert!(scripts.written.borrow().is_empty());
        assert!(scripts.finalized_version.borrow().is_none());
    }

    #[rstest]
    fn writes_and_finalizes_state_scripts() {
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "header-info", HEADER_INFO);
        append(&mut builder, "scripts/pre-install", b"#!/bin/sh\necho hi\n");
        append(&mut builder, "headers/0000/type-info", br#"{"type":"rootfs-image"}"#);
        let bytes = builder.into_inner().expect("finish");

        let scripts = RecordingScripts::default();
        parse_header(std::io::Cursor::new(bytes), &scripts, 42).expect("valid header");
        assert_eq!(scripts.written.borrow().len(), 1);
        assert_eq!(scripts.written.borrow()[0].0, "pre-install");
        assert_eq!(*scripts.finalized_version.borrow(), Some(42));
    }

    #[rstest]
    fn applies_rootfs_image_bug_compat_rewrite() {
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "header-info", HEADER_INFO);
        append(&mut builder, "headers/0000/type-info", br#"{"type":null}"#);
        let bytes = builder.into_inner().expect("finish");

        let scripts = RecordingScripts::default();
        let parsed =
            parse_header(std::io::Cursor::new(bytes), &scripts, 1).expect("valid header");
        assert_eq!(parsed.type_info.type_name, "rootfs-image");
    }

    #[rstest]
    fn parses_meta_data_when_present() {
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "header-info", HEADER_INFO);
        append(&mut builder, "headers/0000/type-info", br#"{"type":"rootfs-image"}"#);
        append(&mut builder, "headers/0000/meta-data", br#"{"build":"7"}"#);
        let bytes = builder.into_inner().expect("finish");

        let scripts = RecordingScripts::default();
        let parsed =
            parse_header(std::io::Cursor::new(bytes), &scripts, 1).expect("valid header");
        assert_eq!(parsed.meta_data["build"], "7");
    }

    #[rstest]
    fn rejects_header_tar_not_starting_with_header_info() {
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "headers/0000/type-info", br#"{"type":"rootfs-image"}"#);
        let bytes = builder.into_inner().expect("finish");

        let scripts = RecordingScripts::default();
        let err = parse_header(std::io::Cursor::new(bytes), &scripts, 1)
            .expect_err("missing header-info");
        assert!(matches!(err, ArtefactError::Structural { .. }));
    }

    #[rstest]
    fn rejects_second_type_info_entry() {
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "header-info", HEADER_INFO);
        append(&mut builder, "headers/0000/type-info", br#"{"type":"rootfs-image"}"#);
        append(&mut builder, "headers/0001/type-info", br#"{"type":"rootfs-image"}"#);
        let bytes = builder.into_inner().expect("finish");

        let scripts = RecordingScripts::default();
        let err = parse_header(std::io::Cursor::new(bytes), &scripts, 1)
            .expect_err("second type-info is rejected");
        assert!(matches!(err, ArtefactError::Parse { reason } if reason == "Multiple header entries found"));
    }

    #[rstest]
    fn rejects_header_info_declaring_no_payloads() {
        let header_info =
            br#"{"payloads":[],"provides":{"artifact_name":"r7"},"depends":{"device_type":["qemux86-64"]}}"#;
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "header-info", header_info);
        let bytes = builder.into_inner().expect("finish");

        let scripts = RecordingScripts::default();
        let err = parse_header(std::io::Cursor::new(bytes), &scripts, 1)
            .expect_err("empty payload list is rejected");
        assert!(matches!(err, ArtefactError::Structural { .. }));
    }

    #[rstest]
    fn rejects_header_info_with_empty_device_type() {
        let header_info =
            br#"{"payloads":[{"name":"rootfs.ext4","type":"rootfs-image"}],"provides":{"artifact_name":"r7"}}"#;
        let mut builder = tar::Builder::new(Vec::new());
        append(&mut builder, "header-info", header_info);
        let bytes = builder.into_inner().expect("finish");

        let scripts = RecordingScripts::default();
        let err = parse_header(std::io::Cursor::new(bytes), &scripts, 1)
            .expect_err("empty device_type is rejected");
        assert!(matches!(err, ArtefactError::Structural { .. }));
    }
}
