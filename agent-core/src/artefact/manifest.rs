//! Plaintext manifest parsing (C3).
//!
//! The manifest is a flat text file: one `<hex-sha256>  <name>` line per
//! payload entry, two spaces between digest and name, newline-terminated.
//! It is read through a [`HashingReader`] with no expected digest so that,
//! once fully consumed, the reader's own body digest is available for
//! signature verification — the manifest is never re-read from a buffer to
//! get that digest.

use std::collections::HashMap;
use std::io::Read;
use std::sync::LazyLock;

use regex::Regex;

use super::digest::Digest;
use super::error::{ArtefactError, Result};
use super::hashing_reader::HashingReader;

/// Longest permitted manifest line, in bytes.
const MAX_LINE_LEN: usize = 166;

static LINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9a-f]{64})  (\S+)$").expect("valid regex"));

const COMPRESSION_SUFFIXES: [&str; 3] = [".gz", ".xz", ".zst"];

/// A parsed manifest: the digest declared for each named entry, plus the
/// digest of the manifest's own plaintext body.
#[derive(Debug, Clone)]
pub struct Manifest {
    digests: HashMap<String, Digest>,
    body_digest: Digest,
}

impl Manifest {
    /// Read and parse a manifest from `reader`, consuming it to
    /// end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::Parse`] if any non-empty line exceeds
    /// [`MAX_LINE_LEN`] or does not match the `<hex-sha256>  <name>`
    /// grammar, and [`ArtefactError::Io`] if the source cannot be read.
    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let mut hashing = HashingReader::new(reader);
        let mut text = String::new();
        hashing.read_to_string(&mut text).map_err(ArtefactError::from)?;
        let body_digest = hashing.finalize();

        let mut digests = HashMap::new();
        for line in text.split('\n') {
            if line.is_empty() {
                continue;
            }
            if line.len() > MAX_LINE_LEN {
                return Err(ArtefactError::Parse {
                    reason: format!(
                        "manifest line exceeds {MAX_LINE_LEN} bytes: {len} bytes",
                        len = line.len()
                    ),
                });
            }
            let captures = LINE_PATTERN
                .captures(line)
                .ok_or_else(|| ArtefactError::Parse {
                    reason: format!("malformed manifest line: {line:?}"),
                })?;
            let digest = Digest::from_hex(&captures[1])?;
            let name = strip_compression_suffix(&captures[2]);
            digests.insert(name.to_owned(), digest);
        }

        Ok(Self {
            digests,
            body_digest,
        })
    }

    /// The digest declared for `name`, if any entry by that name (after
    /// compression-suffix stripping) was present.
    #[must_use]
    pub fn digest_for(&self, name: &str) -> Option<Digest> {
        self.digests.get(strip_compression_suffix(name)).copied()
    }

    /// The digest of the manifest's own plaintext body, used as the
    /// payload for signature verification.
    #[must_use]
    pub fn body_digest(&self) -> Digest {
        self.body_digest
    }

    /// Number of distinct entries declared in the manifest.
    #[must_use]
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    /// Whether the manifest declared no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

fn strip_compression_suffix(name: &str) -> &str {
    for suffix in COMPRESSION_SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return stripped;
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn digest_line(name: &str) -> String {
        format!("{}  {name}", "a".repeat(64))
    }

    #[rstest]
    fn parses_single_entry() {
        let text = format!("{}\n", digest_line("data/0000.tar.gz"));
        let manifest = Manifest::parse(text.as_bytes()).expect("valid manifest");
        assert_eq!(manifest.len(), 1);
        assert!(manifest.digest_for("data/0000.tar").is_some());
    }

    #[rstest]
    fn strips_known_compression_suffixes() {
        let text = format!(
            "{}\n{}\n{}\n",
            digest_line("a.gz"),
            digest_line("b.xz"),
            digest_line("c.zst"),
        );
        let manifest = Manifest::parse(text.as_bytes()).expect("valid manifest");
        assert!(manifest.digest_for("a").is_some());
        assert!(manifest.digest_for("b").is_some());
        assert!(manifest.digest_for("c").is_some());
    }

    #[rstest]
    fn ignores_blank_lines_between_entries() {
        let text = format!("{}\n\n{}\n", digest_line("a"), digest_line("b"));
        let manifest = Manifest::parse(text.as_bytes()).expect("valid manifest");
        assert_eq!(manifest.len(), 2);
    }

    #[rstest]
    fn rejects_line_missing_second_space() {
        let text = format!("{} name\n", "a".repeat(64));
        let err = Manifest::parse(text.as_bytes()).expect_err("single space is malformed");
        assert!(matches!(err, ArtefactError::Parse { .. }));
    }

    #[rstest]
    fn rejects_uppercase_digest() {
        let text = format!("{}  name\n", "A".repeat(64));
        let err = Manifest::parse(text.as_bytes()).expect_err("uppercase digest is malformed");
        assert!(matches!(err, ArtefactError::Parse { .. }));
    }

    #[rstest]
    fn rejects_line_over_max_length() {
        let long_name = "x".repeat(200);
        let text = format!("{}\n", digest_line(&long_name));
        let err = Manifest::parse(text.as_bytes()).expect_err("line too long");
        assert!(matches!(err, ArtefactError::Parse { .. }));
    }

    #[rstest]
    fn duplicate_names_keep_the_last_entry() {
        let first = format!("{}  dup", "a".repeat(64));
        let second = format!("{}  dup", "b".repeat(64));
        let text = format!("{first}\n{second}\n");
        let manifest = Manifest::parse(text.as_bytes()).expect("valid manifest");
        assert_eq!(manifest.len(), 1);
        let expected = Digest::from_hex(&"b".repeat(64)).expect("valid hex");
        assert_eq!(manifest.digest_for("dup"), Some(expected));
    }

    #[rstest]
    fn exposes_body_digest_of_the_plaintext() {
        let text = format!("{}\n", digest_line("a"));
        let manifest = Manifest::parse(text.as_bytes()).expect("valid manifest");
        let expected = {
            let mut hashing = HashingReader::new(text.as_bytes());
            let mut buf = String::new();
            hashing.read_to_string(&mut buf).expect("read");
            hashing.finalize()
        };
        assert_eq!(manifest.body_digest(), expected);
    }
}
