//! Scripted container runtime for engine tests.

use async_trait::async_trait;
use chrono::Utc;
use conveyor_core::pipeline::StepOutcome;
use conveyor_core::runtime::{
    ContainerHandle, ContainerRuntime, LogLine, LogSource, StepSpec,
};
use conveyor_core::{Error, Result};
use futures::stream::BoxStream;
use std::sync::Mutex;

/// A runtime that records every launch request and replies with scripted
/// exit codes. Each container emits one log line.
pub struct MockRuntime {
    started: Mutex<Vec<StepSpec>>,
    exit_codes: Vec<i64>,
    runtime_error: Option<String>,
    reject_start_at: Option<usize>,
}

impl MockRuntime {
    /// Every step exits zero.
    pub fn succeeding() -> Self {
        Self::with_exit_codes(vec![])
    }

    /// Step at position `i` (0-based) exits with `exit_codes[i]`;
    /// positions past the end exit zero.
    pub fn with_exit_codes(exit_codes: Vec<i64>) -> Self {
        Self {
            started: Mutex::new(Vec::new()),
            exit_codes,
            runtime_error: None,
            reject_start_at: None,
        }
    }

    /// Every step reports the given runtime-level execution error
    /// alongside `exit_code`.
    pub fn with_runtime_error(exit_code: i64, message: &str) -> Self {
        Self {
            started: Mutex::new(Vec::new()),
            exit_codes: vec![exit_code],
            runtime_error: Some(message.to_string()),
            reject_start_at: None,
        }
    }

    /// The step at 0-based position `index` is rejected at launch.
    pub fn failing_start_at(index: usize) -> Self {
        Self {
            started: Mutex::new(Vec::new()),
            exit_codes: vec![],
            runtime_error: None,
            reject_start_at: Some(index),
        }
    }

    /// Launch requests accepted so far, in order.
    pub fn started(&self) -> Vec<StepSpec> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn start(&self, spec: StepSpec) -> Result<ContainerHandle> {
        if self.reject_start_at == Some(spec.index) {
            return Err(Error::ExecutionFailed("image not found".to_string()));
        }

        let handle = ContainerHandle {
            build: spec.build,
            index: spec.index,
            container_id: format!("mock-{}-{}", spec.build, spec.index),
        };
        self.started.lock().unwrap().push(spec);
        Ok(handle)
    }

    async fn logs(&self, handle: &ContainerHandle) -> Result<BoxStream<'static, LogLine>> {
        let line = LogLine {
            timestamp: Utc::now(),
            source: LogSource::Stdout,
            content: format!("mock output for step {}", handle.index),
        };
        Ok(Box::pin(futures::stream::iter(vec![line])))
    }

    async fn wait(&self, handle: &ContainerHandle) -> Result<StepOutcome> {
        Ok(StepOutcome {
            exit_code: self.exit_codes.get(handle.index).copied().unwrap_or(0),
            error: self.runtime_error.clone(),
        })
    }
}
