//! Schema IR and its fluent builder

pub mod builder;
pub mod definitions;

pub use builder::SchemaBuilder;
pub use definitions::*;
