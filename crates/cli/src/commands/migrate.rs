use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use quarry_orm::{MigrationStatus, Migrator};

use crate::interactive::Prompt;

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrateCommand {
    /// Apply without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RevertCommand {
    /// Revert every batch instead of only the last one
    #[arg(long)]
    pub all: bool,

    /// Revert without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCommand {}

impl MigrateCommand {
    pub async fn run(&self, migrator: &Migrator, prompt: &dyn Prompt, out: &mut dyn Write) -> Result<()> {
        let pending: Vec<String> = migrator
            .status()
            .await
            .context("Failed to read migration status")?
            .into_iter()
            .filter(|state| state.status == MigrationStatus::Pending)
            .map(|state| format!("{} ({})", state.name, state.database))
            .collect();

        if pending.is_empty() {
            writeln!(out, "{}", style("Nothing to migrate").green())?;
            return Ok(());
        }

        writeln!(out, "{}", style("Pending migrations:").bold().cyan())?;
        for name in &pending {
            writeln!(out, "  {}", name)?;
        }

        if !self.yes && !prompt.confirm(&format!("Apply {} migration(s)?", pending.len()), true)? {
            writeln!(out, "{}", style("Migration cancelled").yellow())?;
            return Ok(());
        }

        tracing::info!("Applying {} pending migration(s)", pending.len());
        let result = migrator.prepare_batch().await.context("Migration failed")?;

        for name in &result.applied_migrations {
            writeln!(out, "  {} {}", style("✓").green(), name)?;
        }
        if let Some(batch) = result.batch {
            writeln!(
                out,
                "{} Applied {} migration(s) as batch {} in {}ms",
                style("✓").green().bold(),
                result.applied_count(),
                batch,
                result.execution_time_ms
            )?;
        }
        Ok(())
    }
}

impl RevertCommand {
    pub async fn run(&self, migrator: &Migrator, prompt: &dyn Prompt, out: &mut dyn Write) -> Result<()> {
        let applied = migrator
            .status()
            .await
            .context("Failed to read migration status")?
            .into_iter()
            .filter(|state| matches!(state.status, MigrationStatus::Applied { .. }))
            .count();

        if applied == 0 {
            writeln!(out, "{}", style("Nothing to revert").green())?;
            return Ok(());
        }

        let question = if self.all {
            format!("Revert all {} applied migration(s)? This drops their schema changes.", applied)
        } else {
            "Revert the last migration batch?".to_string()
        };
        if !self.yes && !prompt.confirm(&question, false)? {
            writeln!(out, "{}", style("Revert cancelled").yellow())?;
            return Ok(());
        }

        let result = if self.all {
            migrator.revert_all_batches().await
        } else {
            migrator.revert_last_batch().await
        }
        .context("Revert failed")?;

        for name in &result.rolled_back_migrations {
            writeln!(out, "  {} {}", style("↩").yellow(), name)?;
        }
        writeln!(
            out,
            "{} Reverted {} migration(s) from {} batch(es) in {}ms",
            style("✓").green().bold(),
            result.rolled_back_count(),
            result.batches.len(),
            result.execution_time_ms
        )?;
        Ok(())
    }
}

impl StatusCommand {
    pub async fn run(&self, migrator: &Migrator, out: &mut dyn Write) -> Result<()> {
        let states = migrator.status().await.context("Failed to read migration status")?;
        if states.is_empty() {
            writeln!(out, "No migrations registered")?;
            return Ok(());
        }

        writeln!(out, "{}", style("Migration status").bold().cyan())?;
        for state in states {
            let line = match state.status {
                MigrationStatus::Applied { batch, applied_at } => format!(
                    "  {} {} [{}] batch {} at {}",
                    style("✓").green(),
                    state.name,
                    state.database,
                    batch,
                    applied_at.format("%Y-%m-%d %H:%M:%S")
                ),
                MigrationStatus::Pending => format!(
                    "  {} {} [{}] pending",
                    style("·").dim(),
                    state.name,
                    state.database
                ),
            };
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }
}
