//! sandbox-pki - bootstrap a sandbox CA, leaf certificates and Kafka keystores
//!
//! ```bash
//! # CA + client/server certificates in ./pki
//! sandbox-pki -d pki
//!
//! # Same, plus keystore bundles for two brokers, wiping ./pki first
//! sandbox-pki -d pki -c -k broker-0,broker-1
//! ```
//!
//! The process exit code identifies the failure category, see
//! [`sandbox_pki::PkiError::exit_code`].

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};

use sandbox_pki::bootstrap::{Bootstrap, BootstrapOutcome, TerminalPassword};
use sandbox_pki::configs::{AppConfig, BootstrapConfig, FailurePolicy, LogFormat};
use sandbox_pki::external_tool::SystemToolInvoker;
use sandbox_pki::{logging, PkiError};

const UNCLASSIFIED_EXIT_CODE: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "sandbox-pki", version, about)]
struct Cli {
    /// Kafka roles to provision keystores for (comma-separated or repeated)
    #[arg(short = 'k', long = "kafka", value_name = "ROLES", value_delimiter = ',')]
    kafka: Vec<String>,

    /// Purge the destination's contents before checking that it is empty
    #[arg(
        short = 'c',
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    cleanup: bool,

    /// Output directory, created if missing
    #[arg(short = 'd', long = "dest", default_value = ".")]
    dest: PathBuf,

    /// Optional TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Provision keystore roles concurrently
    #[arg(long)]
    parallel: bool,

    /// Stop keystore provisioning at the first failing role
    #[arg(long)]
    fail_fast: bool,

    /// trace, debug, info, warn, error or off
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[arg(long, value_enum, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            if let Some(pki_err) = err.downcast_ref::<PkiError>() {
                print_tool_output(pki_err);
            }
            eprintln!("Error: {:#}", err);
            err.downcast_ref::<PkiError>()
                .map(PkiError::exit_code)
                .unwrap_or(UNCLASSIFIED_EXIT_CODE)
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn run(cli: Cli) -> Result<i32> {
    let app_config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    logging::init(&app_config.logging, cli.log_level.as_deref(), cli.log_format)?;

    let mut keystore = app_config.keystore;
    if cli.parallel {
        keystore.parallel = true;
    }
    if cli.fail_fast {
        keystore.failure_policy = FailurePolicy::FailFast;
    }

    let config = BootstrapConfig::new(cli.dest, app_config.ca, cli.kafka, cli.cleanup, keystore)?;
    let invoker = SystemToolInvoker::new(config.keystore.tool_timeout());
    let outcome = Bootstrap::new(&config).run(&TerminalPassword, &invoker)?;

    print_summary(&outcome);
    Ok(outcome.exit_code())
}

fn print_summary(outcome: &BootstrapOutcome) {
    println!("✓ Root CA: {}", outcome.ca_certificate.display());
    println!("✓ Client certificate: {}", outcome.client_certificate.display());
    println!("✓ Server certificate: {}", outcome.server_certificate.display());
    for bundle in &outcome.keystores.bundles {
        println!(
            "✓ Keystore for {}: {}",
            bundle.role,
            bundle.paths.keystore.display()
        );
    }
    for failure in &outcome.keystores.failures {
        print_tool_output(&failure.error);
        eprintln!("✗ Keystore for {}: {}", failure.role, failure.error);
    }
    for role in &outcome.keystores.skipped {
        eprintln!("✗ Keystore for {}: skipped", role);
    }
}

/// Replay a failed tool's own output so the user sees its diagnostics as is.
fn print_tool_output(err: &PkiError) {
    if let PkiError::ExternalToolFailed { stdout, stderr, .. } = err {
        eprint!("{}", stdout);
        eprint!("{}", stderr);
    }
}
