//! Paperdrop: hand scanned documents from a consume folder to Paperless.
//!
//! # Usage
//!
//! ```text
//! paperdrop [run]
//! paperdrop upload <FILE> [--keep]
//! paperdrop config [--json]
//! ```
//!
//! Settings come from the environment. A `.env` file in the working directory
//! is read first and never overrides variables that are already set.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config::ConfigArgs, upload::UploadArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "paperdrop",
    version,
    about = "Watch a folder and upload finished files to Paperless",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the consume folder and upload files as they settle (default).
    Run,

    /// Upload a single file once, without retrying.
    Upload(UploadArgs),

    /// Print the effective configuration with the token redacted.
    Config(ConfigArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => commands::run::run(),
        Commands::Upload(args) => args.run(),
        Commands::Config(args) => args.run(),
    }
}
