//! System configuration parsing.
//!
//! Service-level settings come from a KDL document (`conveyor.kdl`):
//!
//! ```kdl
//! listen "0.0.0.0:8000"
//! scratch-root "/tmp/conveyor"
//! workspace-cleanup "on-completion"
//! max-concurrent-builds 4
//! queue-capacity 16
//! pipeline-template "pipeline.yml.tmpl"
//! ```
//!
//! Every key is optional; unknown nodes are ignored.

use kdl::{KdlDocument, KdlNode};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::{ConfigError, ConfigResult};

/// What happens to a build's workspace directory once the build reaches a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupPolicy {
    /// Delete the workspace tree when the build completes or aborts.
    #[default]
    OnCompletion,
    /// Leave it on disk for external garbage collection.
    Retain,
}

/// System-wide configuration.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    /// Address the HTTP receiver binds to.
    pub listen: SocketAddr,
    /// Root directory build workspaces are allocated under.
    pub scratch_root: PathBuf,
    /// Workspace disposal policy.
    pub workspace_cleanup: CleanupPolicy,
    /// Number of builds executing at once.
    pub max_concurrent_builds: usize,
    /// Pending builds accepted beyond the ones executing.
    pub queue_capacity: usize,
    /// Path of the pipeline definition template.
    pub pipeline_template: PathBuf,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
            scratch_root: PathBuf::from("/tmp/conveyor"),
            workspace_cleanup: CleanupPolicy::OnCompletion,
            max_concurrent_builds: 4,
            queue_capacity: 16,
            pipeline_template: PathBuf::from("pipeline.yml.tmpl"),
        }
    }
}

impl SystemConfig {
    /// Read and parse the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse configuration from KDL text.
    pub fn parse(kdl: &str) -> ConfigResult<Self> {
        let doc: KdlDocument = kdl.parse()?;
        let mut config = Self::default();

        for node in doc.nodes() {
            match node.name().value() {
                "listen" => {
                    let addr = require_string_arg(node, "listen")?;
                    config.listen =
                        addr.parse()
                            .map_err(|_| ConfigError::InvalidValue {
                                field: "listen".to_string(),
                                message: format!("not a socket address: {addr}"),
                            })?;
                }
                "scratch-root" => {
                    config.scratch_root = PathBuf::from(require_string_arg(node, "scratch-root")?);
                }
                "workspace-cleanup" => {
                    let policy = require_string_arg(node, "workspace-cleanup")?;
                    config.workspace_cleanup = match policy.as_str() {
                        "on-completion" => CleanupPolicy::OnCompletion,
                        "retain" => CleanupPolicy::Retain,
                        other => {
                            return Err(ConfigError::InvalidValue {
                                field: "workspace-cleanup".to_string(),
                                message: format!("unknown policy: {other}"),
                            });
                        }
                    };
                }
                "max-concurrent-builds" => {
                    config.max_concurrent_builds =
                        require_positive_int_arg(node, "max-concurrent-builds")?;
                }
                "queue-capacity" => {
                    config.queue_capacity = require_positive_int_arg(node, "queue-capacity")?;
                }
                "pipeline-template" => {
                    config.pipeline_template =
                        PathBuf::from(require_string_arg(node, "pipeline-template")?);
                }
                _ => {} // Ignore unknown nodes
            }
        }

        Ok(config)
    }
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_int_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn require_string_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

fn require_positive_int_arg(node: &KdlNode, field: &str) -> ConfigResult<usize> {
    let value =
        get_first_int_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))?;
    usize::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("must be a positive integer, got {value}"),
        })
}
