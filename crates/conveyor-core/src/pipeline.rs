//! Pipeline and step definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::BuildId;

/// A parsed pipeline document: a document-kind tag plus an ordered list of
/// steps. Step order is execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Document kind. Must be the literal `pipeline`; checked by the parser.
    #[serde(rename = "type")]
    pub kind: String,
    /// Steps, in execution order.
    pub steps: Vec<Step>,
}

impl Pipeline {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// One containerized unit of work within a pipeline.
///
/// Optional fields take their defaults at parse time; keys the engine does
/// not recognize are ignored by the deserializer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Human-readable label, used only for reporting.
    pub name: String,
    /// Container image reference to run the step in.
    pub environment: String,
    /// Override of the image's default entrypoint arguments.
    #[serde(default)]
    pub command: Option<String>,
    /// Environment variables injected into the container.
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Numeric execution identity inside the container.
    #[serde(default)]
    pub user: u32,
    /// Grants the step read-write access to the host's Docker control
    /// socket. A per-step, opt-in privilege escalation for nested
    /// container builds.
    #[serde(default)]
    pub dockersocket: bool,
}

/// Terminal result of one step, as reported by the container runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Process exit status.
    pub exit_code: i64,
    /// Runtime-reported execution error, if any.
    pub error: Option<String>,
}

impl StepOutcome {
    /// A step succeeded only if it exited zero with no runtime error.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }
}

/// Why a build stopped before completing all steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// The rendered template was not valid against the build variables.
    RenderFailed,
    /// The document failed schema validation; no step ran.
    ValidationFailed,
    /// The build workspace could not be allocated; no step ran.
    ProvisioningFailed,
    /// The runtime rejected a step launch. `index` is 1-based.
    LaunchFailed { step: String, index: usize },
    /// A step exited non-zero or the runtime reported an execution error.
    /// `index` is 1-based.
    StepFailed { step: String, index: usize },
}

/// Overall build status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    /// Currently executing steps.
    Running,
    /// All steps completed with zero exit status.
    Completed,
    /// Stopped before completion. Abort is final; there is no resume.
    Aborted(AbortReason),
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Completed | BuildStatus::Aborted(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Completed)
    }
}

/// Summary of one finished build. Logged, never persisted.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub id: BuildId,
    pub status: BuildStatus,
    /// How many steps actually started.
    pub steps_run: usize,
}
