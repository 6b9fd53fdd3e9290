//! Lazy, forward-only tar entry sequencing (C2).
//!
//! A thin seam over the `tar` crate: entries are yielded in archive order,
//! each bounded to its own size, and the underlying source is never
//! sought — only ever read forward. Advancing past an entry without fully
//! reading it is handled by the `tar` crate itself, which discards the
//! remainder (including block padding) before yielding the next header.
//!
//! This module intentionally does not wrap [`tar::Archive`]/[`tar::Entry`]
//! in a newtype: the [`tar`] crate's own `Entries` iterator already yields
//! entries lazily, in order, bounded to size, without seeking — exactly
//! the C2 contract. [`entry_name`] is the one piece of normalization
//! every caller needs (a consistent, UTF-8-checked name), so that is all
//! this module adds.

use std::io::Read;

use super::error::{ArtefactError, Result};

/// Read an entry's archive path as a UTF-8 string.
///
/// # Errors
///
/// Returns [`ArtefactError::Io`] if the entry's path bytes cannot be read,
/// or [`ArtefactError::Structural`] if they are not valid UTF-8.
pub fn entry_name<R: Read>(entry: &tar::Entry<'_, R>) -> Result<String> {
    let path = entry.path().map_err(ArtefactError::from)?;
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| ArtefactError::Structural {
            reason: "archive entry name is not valid UTF-8".to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, *contents)
                .expect("append entry");
        }
        builder.into_inner().expect("finish tar")
    }

    #[test]
    fn yields_entries_in_order() {
        let bytes = build_tar(&[("a", b"one"), ("b", b"two")]);
        let mut archive = tar::Archive::new(std::io::Cursor::new(bytes));
        let mut names = Vec::new();
        for entry in archive.entries().expect("entries") {
            let entry = entry.expect("entry");
            names.push(entry_name(&entry).expect("name"));
        }
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn advancing_skips_unread_bytes_of_previous_entry() {
        let bytes = build_tar(&[("a", b"unread-body-bytes"), ("b", b"two")]);
        let mut archive = tar::Archive::new(std::io::Cursor::new(bytes));
        let mut entries = archive.entries().expect("entries");
        let _first = entries.next().expect("first entry").expect("ok");
        // deliberately not read
        let second = entries.next().expect("second entry").expect("ok");
        assert_eq!(entry_name(&second).expect("name"), "b");
    }

    #[test]
    fn empty_archive_yields_no_entries() {
        let builder = tar::Builder::new(Vec::new());
        let bytes = builder.into_inner().expect("finish");
        let mut archive = tar::Archive::new(std::io::Cursor::new(bytes));
        let mut entries = archive.entries().expect("entries");
        assert!(entries.next().is_none());
    }
}
