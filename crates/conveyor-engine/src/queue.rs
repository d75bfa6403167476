//! Build admission queue and worker pool.
//!
//! Incoming triggers are admitted through a bounded channel drained by a
//! fixed number of workers; a full channel rejects the trigger instead of
//! spawning unbounded work against the container runtime. Each worker
//! takes a request through render, validate, and orchestrate; a build's
//! failure is isolated to that build.

use conveyor_config::{BuildVars, parse_pipeline, template};
use conveyor_core::BuildId;
use conveyor_core::pipeline::{AbortReason, BuildReport, BuildStatus};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info, warn};

use crate::{EngineError, Orchestrator};

/// One admitted trigger, waiting for a worker.
#[derive(Debug)]
pub struct BuildRequest {
    pub id: BuildId,
    pub sha: String,
    pub clone_url: String,
}

/// Handle for submitting builds to the worker pool.
pub struct BuildQueue {
    tx: mpsc::Sender<BuildRequest>,
}

impl BuildQueue {
    /// Spawn `workers` worker tasks draining a queue of `capacity` pending
    /// requests.
    pub fn start(
        orchestrator: Arc<Orchestrator>,
        pipeline_template: String,
        capacity: usize,
        workers: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let pipeline_template = Arc::new(pipeline_template);

        for n in 0..workers {
            tokio::spawn(worker_loop(
                n,
                rx.clone(),
                orchestrator.clone(),
                pipeline_template.clone(),
            ));
        }

        Self { tx }
    }

    /// Admit a build for the given commit, without blocking.
    ///
    /// Returns the build's id immediately; the build itself runs on a
    /// worker. A full queue yields [`EngineError::Saturated`].
    pub fn submit(
        &self,
        sha: impl Into<String>,
        clone_url: impl Into<String>,
    ) -> Result<BuildId, EngineError> {
        let request = BuildRequest {
            id: BuildId::new(),
            sha: sha.into(),
            clone_url: clone_url.into(),
        };
        let id = request.id;

        self.tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EngineError::Saturated,
            mpsc::error::TrySendError::Closed(_) => EngineError::Runtime(
                conveyor_core::Error::Internal("build workers are gone".to_string()),
            ),
        })?;

        info!(build = %id, "Build queued");
        Ok(id)
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<BuildRequest>>>,
    orchestrator: Arc<Orchestrator>,
    pipeline_template: Arc<String>,
) {
    info!(worker = worker, "Starting build worker");

    loop {
        let request = rx.lock().await.recv().await;
        let Some(request) = request else {
            info!(worker = worker, "Build queue closed, stopping worker");
            break;
        };

        info!(worker = worker, build = %request.id, sha = %request.sha, "Claimed build");
        let report = execute(&orchestrator, &pipeline_template, request).await;

        if report.status.is_success() {
            info!(
                worker = worker,
                build = %report.id,
                steps = report.steps_run,
                "Build finished"
            );
        } else {
            warn!(
                worker = worker,
                build = %report.id,
                status = ?report.status,
                "Build did not complete"
            );
        }
    }
}

/// Take one admitted request through render, validate, orchestrate.
async fn execute(
    orchestrator: &Orchestrator,
    pipeline_template: &str,
    request: BuildRequest,
) -> BuildReport {
    let vars = BuildVars::new(request.sha, request.clone_url);

    let rendered = match template::render(pipeline_template, &vars) {
        Ok(text) => text,
        Err(e) => {
            error!(build = %request.id, error = %e, "Template rendering failed");
            return BuildReport {
                id: request.id,
                status: BuildStatus::Aborted(AbortReason::RenderFailed),
                steps_run: 0,
            };
        }
    };

    let pipeline = match parse_pipeline(&rendered) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(build = %request.id, error = %e, "Pipeline validation failed");
            return BuildReport {
                id: request.id,
                status: BuildStatus::Aborted(AbortReason::ValidationFailed),
                steps_run: 0,
            };
        }
    };

    orchestrator.run(request.id, pipeline).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRuntime;
    use conveyor_config::CleanupPolicy;
    use std::path::PathBuf;
    use std::time::Duration;
    use uuid::Uuid;

    const TEMPLATE: &str = r#"
type: pipeline
steps:
  - name: clone
    environment: alpine/git:latest
    params:
      COMMIT: ${git.sha}
      REPO_URL: ${git.clone_url}
"#;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("conveyor-queue-test-{}", Uuid::new_v4()))
    }

    fn orchestrator(runtime: Arc<MockRuntime>, root: PathBuf) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(runtime, root, CleanupPolicy::OnCompletion))
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_full_queue_rejects_submission() {
        let runtime = Arc::new(MockRuntime::succeeding());
        let root = scratch_dir();
        // No workers: nothing drains the queue.
        let queue = BuildQueue::start(
            orchestrator(runtime, root.clone()),
            TEMPLATE.to_string(),
            2,
            0,
        );

        assert!(queue.submit("aaa111", "https://example.com/a.git").is_ok());
        assert!(queue.submit("bbb222", "https://example.com/b.git").is_ok());
        assert!(matches!(
            queue.submit("ccc333", "https://example.com/c.git"),
            Err(EngineError::Saturated)
        ));

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_submitted_build_renders_and_executes() {
        let runtime = Arc::new(MockRuntime::succeeding());
        let root = scratch_dir();
        let queue = BuildQueue::start(
            orchestrator(runtime.clone(), root.clone()),
            TEMPLATE.to_string(),
            4,
            1,
        );

        let id = queue
            .submit("abc123def", "https://example.com/repo.git")
            .unwrap();

        wait_until(|| !runtime.started().is_empty()).await;

        let started = runtime.started();
        assert_eq!(started[0].build, id);
        assert_eq!(started[0].env.get("COMMIT").unwrap(), "abc123def");
        assert_eq!(
            started[0].env.get("REPO_URL").unwrap(),
            "https://example.com/repo.git"
        );

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_render_failure_runs_no_steps_and_spares_the_worker() {
        let runtime = Arc::new(MockRuntime::succeeding());
        let root = scratch_dir();
        let bad_template = "type: pipeline\nsteps:\n  - name: x\n    environment: ${git.branch}\n";
        let queue = BuildQueue::start(
            orchestrator(runtime.clone(), root.clone()),
            bad_template.to_string(),
            4,
            1,
        );

        queue.submit("abc123", "url").unwrap();
        queue.submit("def456", "url").unwrap();

        // Both builds fail at rendering; no container starts and the
        // worker keeps accepting new work.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(runtime.started().is_empty());
        assert!(queue.submit("ghi789", "url").is_ok());

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_invalid_document_kind_runs_no_steps() {
        let runtime = Arc::new(MockRuntime::succeeding());
        let root = scratch_dir();
        let template = "type: deployment\nsteps:\n  - name: x\n    environment: alpine\n";
        let queue = BuildQueue::start(
            orchestrator(runtime.clone(), root.clone()),
            template.to_string(),
            4,
            1,
        );

        queue.submit("abc123", "url").unwrap();

        // Give the worker time to reject it.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(runtime.started().is_empty());

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_execute_reports_validation_failure() {
        let runtime = Arc::new(MockRuntime::succeeding());
        let root = scratch_dir();
        let orch = orchestrator(runtime, root.clone());

        let request = BuildRequest {
            id: BuildId::new(),
            sha: "abc123".to_string(),
            clone_url: "url".to_string(),
        };
        let report = execute(&orch, "type: deployment\nsteps: []\n", request).await;

        assert_eq!(
            report.status,
            BuildStatus::Aborted(AbortReason::ValidationFailed)
        );
        assert_eq!(report.steps_run, 0);

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_execute_reports_render_failure() {
        let runtime = Arc::new(MockRuntime::succeeding());
        let root = scratch_dir();
        let orch = orchestrator(runtime, root.clone());

        let request = BuildRequest {
            id: BuildId::new(),
            sha: "abc123".to_string(),
            clone_url: "url".to_string(),
        };
        let report = execute(&orch, "image: ${git.tag}", request).await;

        assert_eq!(report.status, BuildStatus::Aborted(AbortReason::RenderFailed));

        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
