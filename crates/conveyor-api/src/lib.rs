//! HTTP trigger receiver for Conveyor.
//!
//! Accepts Git push events and admits them to the build queue. Build
//! progress is observable through the process log stream, never through
//! the triggering request.

pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
