//! Model System - trait implemented by every database entity

pub mod core_trait;

pub use core_trait::Model;
