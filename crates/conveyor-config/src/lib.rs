//! Configuration parsing for Conveyor.
//!
//! This crate handles:
//! - Build variable templating of pipeline definitions
//! - Pipeline document parsing and validation (YAML)
//! - System configuration (conveyor.kdl)

pub mod error;
pub mod pipeline;
pub mod system;
pub mod template;

pub use error::{ConfigError, ConfigResult};
pub use pipeline::parse_pipeline;
pub use system::{CleanupPolicy, SystemConfig};
pub use template::BuildVars;
