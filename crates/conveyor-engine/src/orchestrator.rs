//! Build orchestrator - executes pipeline steps in declared order.
//!
//! One workspace per build, one step in flight at a time, abort on the
//! first step that fails to launch, exits non-zero, or is reported errored
//! by the runtime. Every log line and lifecycle message goes to the
//! process-wide tracing sink.

use conveyor_config::CleanupPolicy;
use conveyor_core::BuildId;
use conveyor_core::pipeline::{AbortReason, BuildReport, BuildStatus, Pipeline, Step};
use conveyor_core::runtime::{BindMount, ContainerRuntime, StepSpec};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Where the workspace is mounted inside every step's container.
pub const WORKSPACE_MOUNT_PATH: &str = "/workspace";

/// Conventional path of the Docker control socket, on the host and inside
/// steps that request it.
pub const DOCKER_SOCKET_PATH: &str = "/var/run/docker.sock";

/// Drives builds through the container runtime. Builds from different
/// triggers run independently; within one build, steps are strictly
/// sequential.
pub struct Orchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    scratch_root: PathBuf,
    cleanup: CleanupPolicy,
}

impl Orchestrator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        scratch_root: PathBuf,
        cleanup: CleanupPolicy,
    ) -> Self {
        Self {
            runtime,
            scratch_root,
            cleanup,
        }
    }

    /// Drive a validated pipeline to a terminal state.
    pub async fn run(&self, build: BuildId, pipeline: Pipeline) -> BuildReport {
        let workspace = match crate::workspace::provision(&self.scratch_root).await {
            Ok(path) => path,
            Err(e) => {
                error!(build = %build, error = %e, "Workspace provisioning failed");
                return BuildReport {
                    id: build,
                    status: BuildStatus::Aborted(AbortReason::ProvisioningFailed),
                    steps_run: 0,
                };
            }
        };

        let (status, steps_run) = self.run_steps(build, &pipeline, &workspace).await;

        crate::workspace::cleanup(&workspace, self.cleanup).await;

        match &status {
            BuildStatus::Completed => {
                info!(build = %build, steps = steps_run, "Build completed")
            }
            BuildStatus::Aborted(reason) => {
                error!(build = %build, reason = ?reason, "Build aborted")
            }
            BuildStatus::Running => unreachable!("run_steps returns a terminal status"),
        }

        BuildReport {
            id: build,
            status,
            steps_run,
        }
    }

    async fn run_steps(
        &self,
        build: BuildId,
        pipeline: &Pipeline,
        workspace: &Path,
    ) -> (BuildStatus, usize) {
        let total = pipeline.len();

        for (index, step) in pipeline.steps.iter().enumerate() {
            let position = index + 1;
            info!(
                build = %build,
                step = %step.name,
                position = position,
                total = total,
                image = %step.environment,
                "Executing step"
            );

            let spec = step_spec(build, index, step, workspace);

            let handle = match self.runtime.start(spec).await {
                Ok(handle) => handle,
                Err(e) => {
                    error!(build = %build, step = %step.name, error = %e, "Step launch rejected");
                    return (
                        BuildStatus::Aborted(AbortReason::LaunchFailed {
                            step: step.name.clone(),
                            index: position,
                        }),
                        index,
                    );
                }
            };

            // Relay output in real time until the container closes it.
            match self.runtime.logs(&handle).await {
                Ok(mut stream) => {
                    while let Some(line) = stream.next().await {
                        info!(
                            build = %build,
                            step = %step.name,
                            emitted = %line.timestamp,
                            "{}",
                            line.content
                        );
                    }
                }
                Err(e) => {
                    warn!(build = %build, step = %step.name, error = %e, "Log stream unavailable");
                }
            }

            let outcome = match self.runtime.wait(&handle).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(build = %build, step = %step.name, error = %e, "Step wait failed");
                    return (
                        BuildStatus::Aborted(AbortReason::StepFailed {
                            step: step.name.clone(),
                            index: position,
                        }),
                        position,
                    );
                }
            };

            if !outcome.is_success() {
                error!(
                    build = %build,
                    step = %step.name,
                    position = position,
                    exit_code = outcome.exit_code,
                    runtime_error = ?outcome.error,
                    "Step failed, aborting build"
                );
                return (
                    BuildStatus::Aborted(AbortReason::StepFailed {
                        step: step.name.clone(),
                        index: position,
                    }),
                    position,
                );
            }

            info!(build = %build, step = %step.name, "Step completed");
        }

        (BuildStatus::Completed, total)
    }
}

/// Translate one parsed step into a runtime launch request.
fn step_spec(build: BuildId, index: usize, step: &Step, workspace: &Path) -> StepSpec {
    let mut mounts = vec![BindMount::read_write(
        workspace.to_string_lossy(),
        WORKSPACE_MOUNT_PATH,
    )];

    // Opt-in privilege escalation: the step may drive the host's Docker
    // daemon, e.g. to build and push images.
    if step.dockersocket {
        mounts.push(BindMount::read_write(DOCKER_SOCKET_PATH, DOCKER_SOCKET_PATH));
    }

    StepSpec {
        build,
        index,
        image: step.environment.clone(),
        command: step.command.as_deref().map(split_command),
        env: step.params.clone(),
        user: step.user,
        mounts,
        working_dir: WORKSPACE_MOUNT_PATH.to_string(),
    }
}

/// Split a step command string into argv. Plain whitespace split, no shell
/// interpolation.
fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}
