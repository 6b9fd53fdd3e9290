//! `authd` — brokers bearer tokens obtained from a configured server list
//! to peer processes on the same device over an IPC bus.
//!
//! This binary is intentionally thin: it loads configuration, wires the
//! authenticator actor to the identity script, crypto, and HTTP
//! collaborators, and bridges its `with_token`/subscribe surface onto an
//! IPC bus. The D-Bus wire transport itself, and everything above "serve
//! this method, emit that signal", is an external collaborator this
//! binary does not implement (§1).

use std::path::PathBuf;
use std::time::Duration;

use agent_common::config::AuthConfig;
use agent_common::crypto::{PrivateKeyPem, RingRsaSigner};
use authd::actor;
use authd::authenticator::{Authenticator, AuthenticatorConfig};
use authd::error::{DaemonError, DaemonResult};
use authd::identity::ProcessCommandRunner;
use authd::ipc::{InMemoryIpcBus, IpcBus};
use authd::transport::HttpAuthTransport;
use clap::Parser;

const SIGNAL_INTERFACE: &str = "io.mender.Authentication1";
const TOKEN_SIGNAL: &str = "JwtTokenStateChange";
const FETCH_METHOD: &str = "FetchJwtToken";

/// Obtain and broker device bearer tokens.
#[derive(Parser, Debug)]
#[command(name = "authd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the daemon's TOML configuration file.
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// Increase verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> DaemonResult<()> {
    let cli = Cli::parse();
    agent_common::logging::init(cli.verbose);
    run(&cli)
}

fn run(cli: &Cli) -> DaemonResult<()> {
    let config = AuthConfig::load(&cli.config)?;

    let key_text =
        std::fs::read_to_string(&config.private_key_path).map_err(|source| DaemonError::Open {
            path: config.private_key_path.clone(),
            source,
        })?;
    let private_key = PrivateKeyPem::parse(&key_text)?;
    let signer = RingRsaSigner::new(&private_key)?;
    let pubkey_pem = pem::encode(&pem::Pem::new("PUBLIC KEY", signer.public_key_der().to_vec()));

    let authenticator = Authenticator::new(
        AuthenticatorConfig {
            servers: config.servers.clone(),
            tenant_token: config.tenant_token.clone(),
        },
        config.identity_script_path.clone(),
        pubkey_pem,
        Box::new(signer),
        Box::new(ProcessCommandRunner::new(config.auth_timeout())),
        Box::new(HttpAuthTransport),
    );

    let handle = actor::spawn(authenticator, config.auth_timeout());

    let bus = InMemoryIpcBus::default();

    let signal_bus = bus.clone();
    handle.subscribe(move |data| {
        signal_bus.emit_signal(SIGNAL_INTERFACE, TOKEN_SIGNAL, data.token.as_bytes());
    });

    let fetch_handle = handle.clone();
    bus.method_handler(
        SIGNAL_INTERFACE,
        FETCH_METHOD,
        Box::new(move |_payload| {
            fetch_handle
                .with_token()
                .recv_timeout(Duration::from_secs(120))
                .map_err(|e| authd::error::AuthdError::Programming {
                    reason: format!("authenticator actor did not reply: {e}"),
                })?
                .map(|data| data.token.into_bytes())
        }),
    );

    log::info!("authd ready, {} server(s) configured", config.servers.len());

    // Blocks forever servicing whatever drives `bus`; the real IPC
    // transport is an external collaborator (§1), so there is nothing
    // further for this thin binary to do once wiring is complete.
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_required_arguments() {
        let cli = Cli::parse_from(["authd", "--config", "/etc/authd.toml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/authd.toml"));
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn cli_counts_repeated_verbose_flags() {
        let cli = Cli::parse_from(["authd", "-vv", "-c", "a.toml"]);
        assert_eq!(cli.verbose, 2);
    }
}
