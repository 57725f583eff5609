//! Migration System
//!
//! Migrations are registered in order on a [`Migrations`] list, bound to a
//! logical database, and applied or reverted in batches by a [`Migrator`].

pub mod definitions;
pub mod registry;
pub mod runner;

pub use definitions::*;
pub use registry::{Migrations, RegisteredMigration};
pub use runner::{single_database_migrator, Migrator};
