//! `agent` — validate and summarize an on-disk update artifact.
//!
//! This binary is intentionally thin: it wires the artifact reader to a
//! file on disk and configuration on disk, and prints what it found.
//! Everything that actually applies an update — the installer process,
//! the boot-flag/rootfs-swap device layer, the key-value state database —
//! is an external collaborator this binary does not implement (§1).

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use agent_common::config::{AgentConfig, VerifySignature};
use agent_common::crypto::PublicKeyPem;
use agent_core::artefact::header::FsStateScriptWriter;
use agent_core::artefact::reader::read_artifact;
use agent_core::artefact::verification::SignatureVerifyPolicy;
use agent_core::error::{AgentError, Result};
use clap::Parser;

/// Validate and summarize a `.mender` artifact against a device
/// configuration.
#[derive(Parser, Debug)]
#[command(name = "agent")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the artifact file to read.
    artifact: PathBuf,

    /// Path to the agent's TOML configuration file.
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// Increase verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    agent_common::logging::init(cli.verbose);
    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let config = AgentConfig::load(&cli.config)?;

    let policy = match config.verify_signature {
        VerifySignature::Skip => SignatureVerifyPolicy::Skip,
        VerifySignature::Verify => {
            let mut keys = Vec::with_capacity(config.signature_key_paths.len());
            for path in &config.signature_key_paths {
                let text = std::fs::read_to_string(path).map_err(|source| AgentError::Open {
                    path: path.clone(),
                    source,
                })?;
                let key = PublicKeyPem::parse(&text).map_err(|e| {
                    agent_core::artefact::error::ArtefactError::Setup {
                        reason: format!("invalid signature key {}: {e}", path.display()),
                    }
                })?;
                keys.push(key);
            }
            SignatureVerifyPolicy::Verify { keys }
        }
    };

    let scripts = FsStateScriptWriter::new(config.scripts_dir.clone())?;

    let file = File::open(&cli.artifact).map_err(|source| AgentError::Open {
        path: cli.artifact.clone(),
        source,
    })?;

    log::info!("reading artifact {}", cli.artifact.display());
    let mut payload_bytes = 0u64;
    let summary = read_artifact(
        file,
        &policy,
        &scripts,
        config.scripts_version,
        |index, name, body| {
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = body
                    .read(&mut buf)
                    .map_err(agent_core::artefact::error::ArtefactError::from)?;
                if n == 0 {
                    break;
                }
                payload_bytes += n as u64;
            }
            log::debug!("payload {index} file {name} verified");
            Ok(())
        },
    )?;

    println!("artifact: {}", cli.artifact.display());
    println!("artifact_name: {}", summary.header_info.provides.artifact_name);
    println!("device_type: {:?}", summary.header_info.depends.device_type);
    println!("payload_type: {}", summary.type_info.type_name);
    println!("manifest entries: {}", summary.manifest_entry_count);
    println!("payload bytes verified: {payload_bytes}");
    println!("provides: {:?}", summary.get_provides());
    println!("depends: {:?}", summary.get_depends());

    Ok(())
}
