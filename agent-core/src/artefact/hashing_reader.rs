//! Streaming SHA-256 verification wrapper (C1).
//!
//! Every byte source the artifact reader consumes — the manifest body, and
//! each payload file's body — passes through exactly one of these so the
//! digest is computed incrementally as bytes are read, never by buffering
//! the whole source up front.

use std::io::{self, Read};

use sha2::{Digest as _, Sha256};

use super::digest::Digest;
use super::error::ArtefactError;

/// Wraps a byte source, hashing every byte as it is read and, optionally,
/// comparing the final digest to an expected value at end-of-stream.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    expected_hex: Option<String>,
    eof_seen: bool,
    mismatch: Option<ArtefactError>,
}

impl<R: Read> HashingReader<R> {
    /// Wrap `inner`, computing its digest with no expectation check.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            expected_hex: None,
            eof_seen: false,
            mismatch: None,
        }
    }

    /// Wrap `inner`, comparing the computed digest to `expected_hex` the
    /// moment the source reaches end-of-stream.
    pub fn with_expected_hex(inner: R, expected_hex: impl Into<String>) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            expected_hex: Some(expected_hex.into()),
            eof_seen: false,
            mismatch: None,
        }
    }

    /// The digest of all bytes read so far. Idempotent: calling this
    /// before, during, or after exhausting the source never changes the
    /// bytes fed to the hasher.
    #[must_use]
    pub fn finalize(&self) -> Digest {
        let bytes: [u8; 32] = self.hasher.clone().finalize().into();
        Digest::from_bytes(bytes)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(err) = &self.mismatch {
            return Err(io::Error::other(err.clone()));
        }

        let n = self.inner.read(buf)?;
        if n == 0 {
            if !self.eof_seen {
                self.eof_seen = true;
                if let Some(expected) = self.expected_hex.clone() {
                    let calculated = self.finalize().to_string();
                    if calculated != expected {
                        let err = ArtefactError::ChecksumMismatch {
                            expected,
                            calculated,
                        };
                        self.mismatch = Some(err.clone());
                        return Err(io::Error::other(err));
                    }
                }
            }
            return Ok(0);
        }

        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Read as _;

    #[rstest]
    fn reads_back_exact_bytes_and_finalizes_to_sha256() {
        let mut reader = HashingReader::new(std::io::Cursor::new(b"foobarbaz".to_vec()));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("read succeeds");
        assert_eq!(out, b"foobarbaz");
        assert_eq!(
            reader.finalize().to_string(),
            "97df3588b5a3f24babc3851b372f0ba71a9dcdded43b14b9d06961bfc1707d9d"
        );
    }

    #[rstest]
    fn matching_expected_digest_reads_cleanly() {
        let mut reader = HashingReader::with_expected_hex(
            std::io::Cursor::new(b"foobarbaz".to_vec()),
            "97df3588b5a3f24babc3851b372f0ba71a9dcdded43b14b9d06961bfc1707d9d",
        );
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("digest matches");
        assert_eq!(out, b"foobarbaz");
    }

    #[rstest]
    fn mismatched_expected_digest_fails_at_eof_with_both_hexes() {
        let mut reader = HashingReader::with_expected_hex(
            std::io::Cursor::new(b"foobarbaz".to_vec()),
            "97df3588b5a3f24babc3851b372f0ba71a9dcdded43b14b9d06961bfc1707d9e",
        );
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).expect_err("digest mismatches");
        let message = err.to_string();
        assert!(message.contains("97df3588b5a3f24babc3851b372f0ba71a9dcdded43b14b9d06961bfc1707d9e"));
        assert!(message.contains("97df3588b5a3f24babc3851b372f0ba71a9dcdded43b14b9d06961bfc1707d9d"));
    }

    #[rstest]
    fn repeated_reads_after_mismatch_return_the_same_error_class() {
        let mut reader =
            HashingReader::with_expected_hex(std::io::Cursor::new(b"foobarbaz".to_vec()), "f".repeat(64));
        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
        let mut buf = [0u8; 8];
        let second = reader.read(&mut buf);
        assert!(second.is_err());
    }

    #[rstest]
    fn empty_source_hashes_to_sha256_of_empty_string() {
        let mut reader = HashingReader::new(std::io::Cursor::new(Vec::<u8>::new()));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("read succeeds");
        assert_eq!(
            reader.finalize().to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
