//! tunedeck command-line entry point.
//!
//! Installs the tracing subscriber, parses the command line and runs the
//! requested command.

use std::process::ExitCode;

use {
    clap::Parser,
    tracing_subscriber::{EnvFilter, fmt},
};

use tunedeck::{
    cli::{Cli, run},
    error::ErrorReporter,
};

/// Main entry point for tunedeck.
///
/// Logging goes to stderr and follows `RUST_LOG`, defaulting to `info`.
#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ErrorReporter::error(&e, "tunedeck");
            eprintln!("Error: {}", ErrorReporter::to_user_message(&e));
            ExitCode::FAILURE
        }
    }
}
