//! HTTP client contract for the auth request (§6).
//!
//! Only the request/response shape the fetch algorithm needs is
//! specified here; this is not a general-purpose HTTP client (§1
//! non-goal). The production implementation is a thin wrapper over
//! `ureq`.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

const AUTH_REQUESTS_PATH: &str = "/api/devices/v1/authentication/auth_requests";

/// Body of the `POST .../auth_requests` request (§6 wire format).
#[derive(Debug, Serialize)]
pub struct AuthRequestBody {
    /// Stringified, sorted-key JSON of the identity script's output.
    pub id_data: String,
    /// PEM-encoded device public key.
    pub pubkey: String,
    /// Optional opaque tenant-scoping token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_token: Option<String>,
}

/// The server's classified reply to an auth request (§4.6 step 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerResponse {
    /// `200`: the body is the issued JWT.
    Token(String),
    /// `401`: this server rejected the device.
    Unauthorized,
    /// `400` or `500`: a recognised API-error class.
    ApiError(u16),
    /// Any other status code.
    Unexpected(u16),
}

/// A single server attempt failed below the HTTP-status level: connection
/// refused, DNS failure, a response body that could not be read, or a
/// request that exceeded its timeout.
#[derive(Debug, Error)]
#[error("request to {server} failed: {reason}")]
pub struct TransportError {
    /// Base URL of the server that was attempted.
    pub server: String,
    /// Human-readable cause.
    pub reason: String,
}

/// The HTTP transport seam the fetch algorithm is built against, enabling
/// dependency injection for tests.
#[cfg_attr(test, mockall::automock)]
pub trait AuthTransport {
    /// POST the signed auth request to `server`, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the request could not be completed at
    /// all. A non-2xx HTTP status is not an error here — it is a
    /// classified [`ServerResponse`] the caller's failover loop recovers
    /// from locally.
    fn post_auth_request(
        &self,
        server: &str,
        body: &[u8],
        signature_hex: &str,
        timeout: Duration,
    ) -> Result<ServerResponse, TransportError>;
}

/// Production [`AuthTransport`] backed by `ureq`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpAuthTransport;

impl AuthTransport for HttpAuthTransport {
    fn post_auth_request(
        &self,
        server: &str,
        body: &[u8],
        signature_hex: &str,
        timeout: Duration,
    ) -> Result<ServerResponse, TransportError> {
        let url = format!("{}{AUTH_REQUESTS_PATH}", server.trim_end_matches('/'));
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        let agent = ureq::Agent::new_with_config(config);

        let response = agent
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("X-MEN-Signature", signature_hex)
            .header("Authorization", "API_KEY")
            .send(body)
            .map_err(|e| TransportError {
                server: server.to_owned(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body_text = response.into_body().read_to_string().map_err(|e| TransportError {
            server: server.to_owned(),
            reason: format!("failed to read response body: {e}"),
        })?;

        Ok(match status {
            200 => ServerResponse::Token(body_text),
            401 => ServerResponse::Unauthorized,
            400 | 500 => ServerResponse::ApiError(status),
            other => ServerResponse::Unexpected(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_request_body_omits_absent_tenant_token() {
        let body = AuthRequestBody {
            id_data: "{}".to_owned(),
            pubkey: "PEM".to_owned(),
            tenant_token: None,
        };
        let json = serde_json::to_string(&body).expect("serializes");
        assert!(!json.contains("tenant_token"));
    }

    #[test]
    fn auth_request_body_includes_a_present_tenant_token() {
        let body = AuthRequestBody {
            id_data: "{}".to_owned(),
            pubkey: "PEM".to_owned(),
            tenant_token: Some("acme".to_owned()),
        };
        let json = serde_json::to_string(&body).expect("serializes");
        assert!(json.contains("\"tenant_token\":\"acme\""));
    }

    #[test]
    fn mock_transport_satisfies_trait_object_use() {
        let mut mock = MockAuthTransport::new();
        mock.expect_post_auth_request()
            .returning(|_, _, _, _| Ok(ServerResponse::Token("jwt".to_owned())));
        let result = mock
            .post_auth_request("https://a.example", b"{}", "sig", Duration::from_secs(1))
            .expect("mock succeeds");
        assert_eq!(result, ServerResponse::Token("jwt".to_owned()));
    }
}
