//! Keepfile CLI entry point.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use keepfile_cli::cli::Cli;
use keepfile_cli::commands;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only values
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.store_config();
    if let Err(e) = commands::execute(cli.command, config).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
