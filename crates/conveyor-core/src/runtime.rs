//! Container runtime trait and step launch types.
//!
//! The engine never talks to a container daemon directly; it consumes this
//! trait. Exactly three operations are required: a detached start, a lazy
//! log stream, and a terminal wait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::pipeline::StepOutcome;
use crate::{BuildId, Result};

/// Everything the runtime needs to launch one step's container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// Build this step belongs to.
    pub build: BuildId,
    /// Position of the step within its pipeline, 0-based.
    pub index: usize,
    /// Container image to run.
    pub image: String,
    /// Entrypoint argument override; `None` keeps the image default.
    pub command: Option<Vec<String>>,
    /// Environment variables.
    pub env: HashMap<String, String>,
    /// Numeric execution identity.
    pub user: u32,
    /// Host paths bound into the container.
    pub mounts: Vec<BindMount>,
    /// Working directory inside the container.
    pub working_dir: String,
}

/// A host path bound into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    /// Host path.
    pub source: String,
    /// Path inside the container.
    pub target: String,
    /// Whether the mount is read-only.
    pub read_only: bool,
}

impl BindMount {
    pub fn read_write(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }
}

/// Handle to a launched container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// The owning build.
    pub build: BuildId,
    /// Step position within the pipeline, 0-based.
    pub index: usize,
    /// Runtime-assigned container id.
    pub container_id: String,
}

/// A line of container output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub source: LogSource,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSource {
    Stdout,
    Stderr,
}

/// Trait for container runtimes.
///
/// `start` must return as soon as the container is running, without
/// waiting for completion, and must not arrange for the container to be
/// removed on exit: its logs stay retrievable and its state inspectable
/// until the build is done with it.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Name of this runtime backend.
    fn name(&self) -> &'static str;

    /// Launch a step's container, detached.
    async fn start(&self, spec: StepSpec) -> Result<ContainerHandle>;

    /// Stream the container's output as it is emitted. The stream is
    /// finite: it ends when the container closes its output. One stream
    /// corresponds to exactly one container lifetime.
    async fn logs(&self, handle: &ContainerHandle) -> Result<BoxStream<'static, LogLine>>;

    /// Wait for the container to reach a terminal state and report its
    /// exit status and any runtime-level execution error.
    async fn wait(&self, handle: &ContainerHandle) -> Result<StepOutcome>;
}
