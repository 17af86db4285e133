//! zipapps - Python zipapp builder and launcher
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use zipapps::cli::{Cli, Commands};
use zipapps::error::ZipappsResult;

/// Overrides the -v derived log filter, e.g. `ZIPAPPS_LOG=zipapps=debug`
const LOG_ENV: &str = "ZIPAPPS_LOG";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ZipappsResult<i32> {
    let cli = Cli::parse();

    // 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("zipapps=warn"),
        1 => EnvFilter::new("zipapps=info"),
        _ => EnvFilter::new("zipapps=debug"),
    });

    // stdout belongs to the dispatched program and to `-` outputs
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Commands::Build(args) => zipapps::cli::commands::build(args).await.map(|()| 0),
        Commands::Run(args) => zipapps::cli::commands::run(args).await,
        Commands::Activate(args) => zipapps::cli::commands::activate(args).await.map(|()| 0),
        Commands::Freeze(args) => zipapps::cli::commands::freeze(args).await.map(|()| 0),
    }
}
