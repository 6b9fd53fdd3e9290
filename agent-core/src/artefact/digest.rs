//! SHA-256 digest newtype shared across the manifest, header, and payload
//! verification paths.
//!
//! Canonical form is 32 raw bytes; the 64-character lowercase hex string
//! used on the wire (manifest lines, signature payloads) is derived from
//! it, not the other way around, so comparisons never depend on case or
//! encoding.

use std::fmt;

use super::error::ArtefactError;

/// Expected length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// A SHA-256 digest: 32 bytes, compared byte-for-byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Wrap a raw 32-byte digest.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character lowercase hex string into a digest.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::Parse`] if `value` is not exactly 64
    /// lowercase hex characters.
    pub fn from_hex(value: &str) -> Result<Self, ArtefactError> {
        if value.len() != DIGEST_HEX_LEN {
            return Err(ArtefactError::Parse {
                reason: format!(
                    "expected {DIGEST_HEX_LEN} hex characters, got {}",
                    value.len()
                ),
            });
        }
        if let Some(bad) = value
            .chars()
            .find(|c| !c.is_ascii_hexdigit() || c.is_ascii_uppercase())
        {
            let reason = if bad.is_ascii_uppercase() {
                "digest must be lowercase".to_owned()
            } else {
                format!("non-hex character '{bad}'")
            };
            return Err(ArtefactError::Parse { reason });
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value, &mut bytes).map_err(|e| ArtefactError::Parse {
            reason: format!("malformed hex digest: {e}"),
        })?;
        Ok(Self(bytes))
    }

    /// The raw 32 bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl TryFrom<&str> for Digest {
    type Error = ArtefactError;

    fn try_from(value: &str) -> Result<Self, ArtefactError> {
        Self::from_hex(value)
    }
}
