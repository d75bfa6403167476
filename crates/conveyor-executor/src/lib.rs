//! Docker container runtime backend for Conveyor.
//!
//! Implements [`conveyor_core::runtime::ContainerRuntime`] against a local
//! Docker daemon.

pub mod docker;

pub use docker::DockerRuntime;
