//! Detached manifest signature policy (§4.5 step 5).
//!
//! The signature, when present, covers the exact bytes of the `manifest`
//! entry body. [`SignatureVerifyPolicy::Skip`] accepts the artifact
//! unconditionally; [`SignatureVerifyPolicy::Verify`] requires the
//! signature to verify against at least one configured key, trying each
//! in order and succeeding on the first match.

use agent_common::crypto::{PublicKeyPem, RingRsaVerifier, SignatureVerifier as _};

use super::error::{ArtefactError, Result};

/// How the artifact reader should treat a `manifest.sig` entry.
pub enum SignatureVerifyPolicy {
    /// Ignore any signature entry; accept the artifact unconditionally.
    Skip,
    /// Require the manifest signature to verify against one of `keys`.
    Verify {
        /// Candidate public keys, consulted in order; any one match
        /// succeeds.
        keys: Vec<PublicKeyPem>,
    },
}

impl SignatureVerifyPolicy {
    /// Check `signature`, if any, over `manifest_body` under this policy.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::Setup`] if the policy is [`Self::Verify`]
    /// with no configured keys (verification was requested but is
    /// impossible regardless of the artifact's contents), and
    /// [`ArtefactError::Signature`] if a signature was required but
    /// absent, or present but did not verify against any configured key.
    pub fn check(&self, manifest_body: &[u8], signature: Option<&[u8]>) -> Result<()> {
        let keys = match self {
            Self::Skip => return Ok(()),
            Self::Verify { keys } => keys,
        };
        if keys.is_empty() {
            return Err(ArtefactError::Setup {
                reason: "signature verification requested but no keys are configured".to_owned(),
            });
        }
        let Some(signature) = signature else {
            return Err(ArtefactError::Signature {
                reason: "signature verification required but no manifest.sig entry was present"
                    .to_owned(),
            });
        };
        let verifier = RingRsaVerifier::new(keys).map_err(|e| ArtefactError::Setup {
            reason: format!("failed to load verification keys: {e}"),
        })?;
        verifier
            .verify(manifest_body, signature)
            .map_err(|_| ArtefactError::Signature {
                reason: "no configured key verified the manifest signature".to_owned(),
            })
    }
}
