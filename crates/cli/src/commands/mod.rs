pub mod migrate;

use std::io::Write;

use anyhow::Result;
use clap::Subcommand;
use quarry_orm::Migrator;

use crate::interactive::Prompt;
pub use migrate::{MigrateCommand, RevertCommand, StatusCommand};

/// Migration commands a host binary mounts under its own parser
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum MigrationCommand {
    /// Apply every pending migration as a new batch
    Migrate(MigrateCommand),
    /// Revert the last batch, or every batch with --all
    Revert(RevertCommand),
    /// Show applied and pending migrations
    Status(StatusCommand),
}

impl MigrationCommand {
    pub async fn run(&self, migrator: &Migrator, prompt: &dyn Prompt, out: &mut dyn Write) -> Result<()> {
        match self {
            MigrationCommand::Migrate(command) => command.run(migrator, prompt, out).await,
            MigrationCommand::Revert(command) => command.run(migrator, prompt, out).await,
            MigrationCommand::Status(command) => command.run(migrator, out).await,
        }
    }
}
