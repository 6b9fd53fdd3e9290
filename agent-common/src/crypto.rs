//! Device signing and signature verification.
//!
//! Two trait seams — [`DeviceSigner`] and [`SignatureVerifier`] — separate
//! the signing/verification *policy* from the cryptographic *mechanism*,
//! the same way the rest of the stack keeps a trait between a subsystem and
//! the thing it talks to (state scripts, the identity command, the auth
//! transport). The production mechanism is RSA-2048 with SHA-256 and
//! PKCS#1 v1.5 padding, implemented with `ring`; keys are carried as PEM
//! text and converted to DER once at construction time via the `pem`
//! crate.

use std::fmt;

use pem::Pem;
use ring::rand::SystemRandom;
use ring::signature::{self, KeyPair as _, RsaKeyPair};
use thiserror::Error;

/// Errors arising from key loading, signing, or verification.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The supplied text was not a well-formed PEM block.
    #[error("invalid PEM encoding: {0}")]
    InvalidPem(#[from] pem::PemError),

    /// The PEM block's tag did not match what the caller expected.
    #[error("unexpected PEM tag {found:?}, expected {expected:?}")]
    UnexpectedTag {
        /// Tag actually present.
        found: String,
        /// Tag the caller required.
        expected: &'static str,
    },

    /// The DER payload was not a key `ring` could parse.
    #[error("rejected key material: {0}")]
    KeyRejected(String),

    /// Signing failed (e.g. the RNG could not be sourced).
    #[error("signing operation failed")]
    SigningFailed,

    /// Signature verification determined the signature does not match.
    #[error("signature does not verify against the supplied key")]
    VerificationFailed,
}

/// A PEM-encoded public key, validated at construction time.
///
/// Stored as the original PEM text rather than raw DER so it can be
/// round-tripped for logging and config serialization; DER is extracted on
/// demand in [`SignatureVerifier`] implementations.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKeyPem(String);

impl PublicKeyPem {
    /// Parse and validate `text` as a PEM-encoded `PUBLIC KEY` block.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPem`] if `text` is not valid PEM, or
    /// [`CryptoError::UnexpectedTag`] if its tag is not `PUBLIC KEY`.
    pub fn parse(text: &str) -> Result<Self, CryptoError> {
        let parsed = pem::parse(text)?;
        if parsed.tag() != "PUBLIC KEY" {
            return Err(CryptoError::UnexpectedTag {
                found: parsed.tag().to_string(),
                expected: "PUBLIC KEY",
            });
        }
        Ok(Self(text.trim().to_string()))
    }

    fn der(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(pem::parse(&self.0)?.contents().to_vec())
    }
}

impl fmt::Debug for PublicKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKeyPem").field(&"<redacted>").finish()
    }
}

/// A PEM-encoded PKCS#8 private key, optionally passphrase-protected.
///
/// Passphrase handling is deliberately not implemented here: `ring` expects
/// unencrypted PKCS#8 DER, so an encrypted key must be decrypted by the
/// caller (typically the identity script, which has access to the
/// passphrase) before being handed to [`RingRsaSigner::new`].
#[derive(Clone)]
pub struct PrivateKeyPem(String);

impl PrivateKeyPem {
    /// Parse and validate `text` as a PEM-encoded `PRIVATE KEY` block.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPem`] if `text` is not valid PEM, or
    /// [`CryptoError::UnexpectedTag`] if its tag is not `PRIVATE KEY`.
    pub fn parse(text: &str) -> Result<Self, CryptoError> {
        let parsed = pem::parse(text)?;
        if parsed.tag() != "PRIVATE KEY" {
            return Err(CryptoError::UnexpectedTag {
                found: parsed.tag().to_string(),
                expected: "PRIVATE KEY",
            });
        }
        Ok(Self(text.trim().to_string()))
    }

    fn der(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(pem::parse(&self.0)?.contents().to_vec())
    }
}

impl fmt::Debug for PrivateKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateKeyPem").field(&"<redacted>").finish()
    }
}

/// Produces a signature over an arbitrary byte payload.
///
/// Implemented by the device during authentication (signing the fetch
/// request) and, in principle, by anything standing in for it in tests.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceSigner {
    /// Sign `payload`, returning the raw signature bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SigningFailed`] if the underlying mechanism
    /// cannot produce a signature.
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Verifies a signature over an arbitrary byte payload against a known
/// public key.
///
/// Implemented by the artifact reader when checking a manifest signature,
/// and by anything standing in for it in tests.
#[cfg_attr(test, mockall::automock)]
pub trait SignatureVerifier {
    /// Verify that `signature` is a valid signature over `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::VerificationFailed`] if the signature does
    /// not match.
    fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<(), CryptoError>;
}

/// RSA-2048/SHA-256 signer backed by `ring`.
pub struct RingRsaSigner {
    key_pair: RsaKeyPair,
    rng: SystemRandom,
}

impl RingRsaSigner {
    /// Load a PKCS#8 private key for signing.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyRejected`] if `key` is not a key `ring`
    /// accepts as an RSA PKCS#8 key pair.
    pub fn new(key: &PrivateKeyPem) -> Result<Self, CryptoError> {
        let der = key.der()?;
        let key_pair =
            RsaKeyPair::from_pkcs8(&der).map_err(|e| CryptoError::KeyRejected(e.to_string()))?;
        Ok(Self {
            key_pair,
            rng: SystemRandom::new(),
        })
    }

    /// The DER-encoded `SubjectPublicKeyInfo` for the paired public key.
    #[must_use]
    pub fn public_key_der(&self) -> &[u8] {
        self.key_pair.public_key().as_ref()
    }
}

impl DeviceSigner for RingRsaSigner {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut signature = vec![0u8; self.key_pair.public_modulus_len()];
        self.key_pair
            .sign(&signature::RSA_PKCS1_SHA256, &self.rng, payload, &mut signature)
            .map_err(|_| CryptoError::SigningFailed)?;
        Ok(signature)
    }
}

/// RSA-2048/SHA-256 verifier backed by `ring`, checking against a fixed set
/// of candidate public keys.
///
/// Verification succeeds if the signature matches *any* configured key,
/// matching deployments that rotate keys without requiring every device to
/// be reconfigured atomically.
pub struct RingRsaVerifier {
    keys_der: Vec<Vec<u8>>,
}

impl RingRsaVerifier {
    /// Build a verifier over one or more candidate public keys.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPem`] or [`CryptoError::UnexpectedTag`]
    /// if any key fails to parse as DER.
    pub fn new(keys: &[PublicKeyPem]) -> Result<Self, CryptoError> {
        let keys_der = keys.iter().map(PublicKeyPem::der).collect::<Result<_, _>>()?;
        Ok(Self { keys_der })
    }
}

impl SignatureVerifier for RingRsaVerifier {
    fn verify(&self, payload: &[u8], sig: &[u8]) -> Result<(), CryptoError> {
        let matches_any = self.keys_der.iter().any(|der| {
            signature::UnparsedPublicKey::new(&signature::RSA_PKCS1_2048_8192_SHA256, der)
                .verify(payload, sig)
                .is_ok()
        });
        if matches_any {
            Ok(())
        } else {
            Err(CryptoError::VerificationFailed)
        }
    }
}
