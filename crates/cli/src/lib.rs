//! Migrate and revert commands for binaries that embed quarry.
//!
//! The host registers its migrations, builds a [`Migrator`] and mounts
//! [`MigrationCommand`] as a `clap` subcommand:
//!
//! ```no_run
//! use clap::Parser;
//! use quarry_cli::MigrationCommand;
//!
//! #[derive(Parser)]
//! struct Cli {
//!     #[command(subcommand)]
//!     command: MigrationCommand,
//! }
//!
//! # async fn run(migrator: quarry_orm::Migrator) -> anyhow::Result<()> {
//! quarry_cli::init_tracing();
//! let cli = Cli::parse();
//! quarry_cli::run(&cli.command, &migrator).await
//! # }
//! ```

pub mod commands;
pub mod interactive;

use anyhow::Result;
use quarry_orm::Migrator;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use commands::{MigrateCommand, MigrationCommand, RevertCommand, StatusCommand};
pub use interactive::{FixedPrompt, Prompt, TerminalPrompt};

/// Install a `tracing` subscriber filtered by `RUST_LOG`, `info` by default.
///
/// Log lines go to stderr so they do not interleave with command output.
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(Layer::new().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

/// Run `command` against the terminal: output to stdout, questions through
/// `inquire`
pub async fn run(command: &MigrationCommand, migrator: &Migrator) -> Result<()> {
    let mut stdout = std::io::stdout();
    command.run(migrator, &TerminalPrompt, &mut stdout).await
}
