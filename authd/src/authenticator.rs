//! The authenticator's state machine and fetch algorithm (C6, §4.6).
//!
//! This module is the pure logic: state transitions and the blocking
//! fetch sequence over the identity script, signer, and server list.
//! [`crate::actor`] is the thread/channel translation that drives it as
//! the process's single cooperative scheduler (§5).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use agent_common::crypto::DeviceSigner;

use crate::error::AuthdError;
use crate::identity::{parse_identity_data, CommandRunner};
use crate::transport::{AuthRequestBody, AuthTransport, ServerResponse};

/// A usable bearer token bound to the server that issued it (§3 `AuthData`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthData {
    /// Base URL of the server that issued `token`.
    pub server_url: String,
    /// The opaque bearer token itself.
    pub token: String,
}

/// The authenticator's state (§4.6).
#[derive(Debug, Clone)]
pub enum AuthPhase {
    /// No token has ever been fetched.
    Idle,
    /// A fetch is currently running.
    Fetching,
    /// A token is cached and considered valid.
    Cached(AuthData),
    /// A previously cached token was explicitly invalidated.
    Expired(AuthData),
    /// The most recent fetch exhausted every server, or timed out.
    Failed,
}

/// Parameters of the fetch algorithm that stay fixed across fetches.
pub struct AuthenticatorConfig {
    /// Servers tried in order on every fetch; must be non-empty.
    pub servers: Vec<String>,
    /// Optional opaque tenant-scoping token included verbatim in requests.
    pub tenant_token: Option<String>,
}

/// The stateful coordinator described in §4.6: supplies [`AuthData`] on
/// demand, hiding multi-server failover, transient failures, and expiry.
pub struct Authenticator {
    config: AuthenticatorConfig,
    identity_script: PathBuf,
    pubkey_pem: String,
    signer: Box<dyn DeviceSigner + Send>,
    identity: Box<dyn CommandRunner + Send>,
    transport: Box<dyn AuthTransport + Send>,
    phase: AuthPhase,
}

impl Authenticator {
    /// Build an authenticator. `pubkey_pem` is derived once from the
    /// concrete signing key before it is boxed behind [`DeviceSigner`],
    /// since that trait only exposes `sign`, not key extraction.
    #[must_use]
    pub fn new(
        config: AuthenticatorConfig,
        identity_script: PathBuf,
        pubkey_pem: String,
        signer: Box<dyn DeviceSigner + Send>,
        identity: Box<dyn CommandRunner + Send>,
        transport: Box<dyn AuthTransport + Send>,
    ) -> Self {
        debug_assert!(!config.servers.is_empty(), "server list must be non-empty");
        Self {
            config,
            identity_script,
            pubkey_pem,
            signer,
            identity,
            transport,
            phase: AuthPhase::Idle,
        }
    }

    /// The current state.
    pub fn phase(&self) -> &AuthPhase {
        &self.phase
    }

    /// Invalidate a cached token (§4.6 `expire_token`); a no-op unless a
    /// token is currently cached.
    pub fn expire(&mut self) {
        if let AuthPhase::Cached(data) = &self.phase {
            self.phase = AuthPhase::Expired(data.clone());
        }
    }

    /// Run the fetch algorithm: identity script, signed request, strict
    /// failover across `config.servers` (§4.6 steps 1-6).
    ///
    /// `cancel_flag` is polled between steps; once set (by the actor's
    /// timeout timer, §3) the fetch abandons any remaining servers and
    /// reports the timeout error. `budget` independently bounds the total
    /// wall-clock this call may take: each server attempt is given no
    /// more than the remaining budget, so a single unresponsive server
    /// cannot consume more than its fair share (`cancel_flag` and
    /// `budget` are set from the same duration by the caller; the flag
    /// covers the gap between attempts, the per-attempt timeout covers
    /// the attempt itself).
    ///
    /// # Errors
    ///
    /// Returns [`AuthdError::Identity`] if the identity script cannot run,
    /// [`AuthdError::Programming`] if signing fails, or
    /// [`AuthdError::Authentication`] if every server was tried without
    /// success or the budget elapsed first.
    pub fn fetch(&mut self, cancel_flag: &AtomicBool, budget: Duration) -> Result<AuthData, AuthdError> {
        self.phase = AuthPhase::Fetching;
        let deadline = Instant::now() + budget;

        let stdout = self.identity.run(&self.identity_script)?;
        let id_data = parse_identity_data(&stdout);
        let id_data_json = serde_json::to_string(&id_data).unwrap_or_else(|e| {
            debug_assert!(false, "identity data must always serialize: {e}");
            "{}".to_owned()
        });

        let request = AuthRequestBody {
            id_data: id_data_json,
            pubkey: self.pubkey_pem.clone(),
            tenant_token: self.config.tenant_token.clone(),
        };
        let body = serde_json::to_vec(&request).map_err(|e| {
            debug_assert!(false, "auth request body must always serialize: {e}");
            AuthdError::Programming {
                reason: format!("failed to encode auth request: {e}"),
            }
        })?;

        let signature = self
            .signer
            .sign(&body)
            .map_err(|e| AuthdError::Programming {
                reason: format!("failed to sign auth request: {e}"),
            })?;
        let signature_hex = hex::encode(signature);

        for server in &self.config.servers {
            if cancel_flag.load(Ordering::SeqCst) {
                return self.time_out();
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.time_out();
            }

            match self
                .transport
                .post_auth_request(server, &body, &signature_hex, remaining)
            {
                Ok(ServerResponse::Token(token)) => {
                    let data = AuthData {
                        server_url: server.clone(),
                        token,
                    };
                    self.phase = AuthPhase::Cached(data.clone());
                    return Ok(data);
                }
                Ok(ServerResponse::Unauthorized) => {
                    log::warn!("server {server} rejected the device as unauthorized");
                }
                Ok(ServerResponse::ApiError(status)) => {
                    log::warn!("server {server} returned API error status {status}");
                }
                Ok(ServerResponse::Unexpected(status)) => {
                    log::warn!("server {server} returned unexpected status {status}");
                }
                Err(e) => {
                    log::warn!("server {server} request failed: {e}");
                }
            }
        }

        self.phase = AuthPhase::Failed;
        Err(AuthdError::Authentication {
            reason: "No more servers to try for authentication".to_owned(),
        })
    }

    fn time_out(&mut self) -> Result<AuthData, AuthdError> {
        self.phase = AuthPhase::Failed;
        Err(AuthdError::Authentication {
            reason: "Timed-out waiting for a new token".to_owned(),
        })
    }
}
