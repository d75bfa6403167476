//! Core domain types and traits for the Conveyor pipeline executor.
//!
//! This crate contains:
//! - Build identifiers
//! - Pipeline and step definitions
//! - Build status and abort reasons
//! - The container runtime trait the engine executes against

pub mod error;
pub mod id;
pub mod pipeline;
pub mod runtime;

pub use error::{Error, Result};
pub use id::BuildId;
