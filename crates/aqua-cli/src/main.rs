use anyhow::Result;
use aqua_cli::commands::{tree, Command};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Aqua provenance tree inspection and verification.
#[derive(Parser, Debug)]
#[command(name = "aqua", author = "Aqua Contributors", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Log { file } => {
            tree::cmd_log(&file)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify(args) => {
            if tree::cmd_verify(&args).await? {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
