//! Docker runtime implementation.

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, StartContainerOptions,
    WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use chrono::{DateTime, Utc};
use conveyor_core::pipeline::StepOutcome;
use conveyor_core::runtime::*;
use conveyor_core::{Error, Result};
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, info, warn};

/// Container runtime backed by the local Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    pub fn connect() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    fn container_name(spec: &StepSpec) -> String {
        format!("conveyor-build-{}-step-{}", spec.build, spec.index)
    }

    async fn pull_image(&self, image: &str) {
        info!(image = %image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut pull_stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = pull_stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!(status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    // Create still succeeds for locally cached images.
                    warn!(error = %e, "Pull warning");
                }
            }
        }
    }

    async fn exit_status_from_inspect(&self, container_id: &str) -> Result<StepOutcome> {
        let inspect = self
            .docker
            .inspect_container(container_id, None)
            .await
            .map_err(|e| Error::NotFound(format!("container not found: {e}")))?;

        let state = inspect
            .state
            .ok_or_else(|| Error::Internal("container has no state".to_string()))?;

        Ok(StepOutcome {
            exit_code: state.exit_code.unwrap_or_default(),
            error: state.error.filter(|e| !e.is_empty()),
        })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn start(&self, spec: StepSpec) -> Result<ContainerHandle> {
        let container_name = Self::container_name(&spec);

        self.pull_image(&spec.image).await;

        let env: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let host_config = HostConfig {
            binds: binds_for(&spec.mounts),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: spec.command.clone(),
            env: Some(env),
            user: Some(spec.user.to_string()),
            working_dir: Some(spec.working_dir.clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.clone(),
            platform: None,
        };

        // The container is created without auto-remove so its logs stay
        // retrievable and its exit state inspectable after it stops.
        info!(container = %container_name, "Creating container");
        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .map_err(|e| Error::ExecutionFailed(format!("failed to create container: {e}")))?;

        info!(container = %container_name, "Starting container");
        self.docker
            .start_container(&container_name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::ExecutionFailed(format!("failed to start container: {e}")))?;

        Ok(ContainerHandle {
            build: spec.build,
            index: spec.index,
            container_id: container.id,
        })
    }

    async fn logs(&self, handle: &ContainerHandle) -> Result<BoxStream<'static, LogLine>> {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            timestamps: true,
            ..Default::default()
        };

        let stream = self.docker.logs(&handle.container_id, Some(options));

        let mapped = stream.filter_map(|result| async move {
            match result {
                Ok(output) => Some(match output {
                    LogOutput::StdErr { message } => parse_log_frame(&message, LogSource::Stderr),
                    LogOutput::StdOut { message }
                    | LogOutput::Console { message }
                    | LogOutput::StdIn { message } => parse_log_frame(&message, LogSource::Stdout),
                }),
                Err(e) => {
                    warn!(error = %e, "Log stream error");
                    None
                }
            }
        });

        Ok(Box::pin(mapped))
    }

    async fn wait(&self, handle: &ContainerHandle) -> Result<StepOutcome> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self
            .docker
            .wait_container(&handle.container_id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(StepOutcome {
                exit_code: response.status_code,
                error: response.error.and_then(|e| e.message),
            }),
            // Non-zero exits surface as a dedicated error variant carrying
            // the status code.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { error, code })) => {
                Ok(StepOutcome {
                    exit_code: code,
                    error: if error.is_empty() { None } else { Some(error) },
                })
            }
            Some(Err(e)) => Err(Error::ExecutionFailed(format!(
                "failed to wait for container: {e}"
            ))),
            None => self.exit_status_from_inspect(&handle.container_id).await,
        }
    }
}

/// Format bind mounts as Docker `host:container:mode` strings.
fn binds_for(mounts: &[BindMount]) -> Option<Vec<String>> {
    if mounts.is_empty() {
        return None;
    }
    Some(
        mounts
            .iter()
            .map(|m| {
                let mode = if m.read_only { "ro" } else { "rw" };
                format!("{}:{}:{}", m.source, m.target, mode)
            })
            .collect(),
    )
}

/// Map one log frame to a [`LogLine`], lifting the RFC3339 timestamp the
/// daemon prepends in timestamps mode. Falls back to receipt time when the
/// prefix is missing or unparsable.
fn parse_log_frame(message: &[u8], source: LogSource) -> LogLine {
    let raw = String::from_utf8_lossy(message);
    let raw = raw.trim_end();

    let (timestamp, content) = match raw.split_once(' ') {
        Some((prefix, rest)) => match DateTime::parse_from_rfc3339(prefix) {
            Ok(ts) => (ts.with_timezone(&Utc), rest.to_string()),
            Err(_) => (Utc::now(), raw.to_string()),
        },
        None => (Utc::now(), raw.to_string()),
    };

    LogLine {
        timestamp,
        source,
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_core::BuildId;
    use std::collections::HashMap;

    fn make_spec(mounts: Vec<BindMount>) -> StepSpec {
        StepSpec {
            build: BuildId::new(),
            index: 0,
            image: "alpine:latest".to_string(),
            command: Some(vec!["echo".to_string(), "hello".to_string()]),
            env: HashMap::new(),
            user: 0,
            mounts,
            working_dir: "/workspace".to_string(),
        }
    }

    #[test]
    fn test_container_name_carries_build_and_step() {
        let spec = make_spec(vec![]);
        let name = DockerRuntime::container_name(&spec);

        assert!(name.starts_with("conveyor-build-"));
        assert!(name.ends_with("-step-0"));
    }

    #[test]
    fn test_container_name_unique_per_build() {
        let name1 = DockerRuntime::container_name(&make_spec(vec![]));
        let name2 = DockerRuntime::container_name(&make_spec(vec![]));
        assert_ne!(name1, name2);
    }

    #[test]
    fn test_binds_format() {
        let mounts = vec![
            BindMount::read_write("/tmp/conveyor/build-1", "/workspace"),
            BindMount {
                source: "/etc/ca-certs".to_string(),
                target: "/certs".to_string(),
                read_only: true,
            },
        ];

        let binds = binds_for(&mounts).unwrap();
        assert_eq!(binds[0], "/tmp/conveyor/build-1:/workspace:rw");
        assert_eq!(binds[1], "/etc/ca-certs:/certs:ro");
    }

    #[test]
    fn test_no_mounts_means_no_binds() {
        assert!(binds_for(&[]).is_none());
    }

    #[test]
    fn test_parse_log_frame_with_timestamp() {
        let frame = b"2024-05-01T12:30:45.123456789Z building step one\n";
        let line = parse_log_frame(frame, LogSource::Stdout);

        assert_eq!(line.content, "building step one");
        assert_eq!(line.source, LogSource::Stdout);
        assert_eq!(
            line.timestamp,
            DateTime::parse_from_rfc3339("2024-05-01T12:30:45.123456789Z").unwrap()
        );
    }

    #[test]
    fn test_parse_log_frame_without_timestamp() {
        let line = parse_log_frame(b"no timestamp here\n", LogSource::Stderr);

        assert_eq!(line.content, "no timestamp here");
        assert_eq!(line.source, LogSource::Stderr);
    }
}
