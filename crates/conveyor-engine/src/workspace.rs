//! Per-build workspace provisioning.
//!
//! Every build gets one fresh directory under the configured scratch
//! root; all of its steps share that directory sequentially. Disposal is
//! governed by the configured [`CleanupPolicy`].

use conveyor_config::CleanupPolicy;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::EngineError;

/// Allocate a new, uniquely named workspace directory under `scratch_root`.
pub async fn provision(scratch_root: &Path) -> Result<PathBuf, EngineError> {
    let path = scratch_root.join(format!("build-{}", Uuid::new_v4()));
    tokio::fs::create_dir_all(&path).await?;
    debug!(workspace = %path.display(), "Provisioned workspace");
    Ok(path)
}

/// Dispose of a build's workspace according to `policy`.
///
/// Removal failure is logged and swallowed; the build's outcome is
/// already decided by the time this runs.
pub async fn cleanup(path: &Path, policy: CleanupPolicy) {
    match policy {
        CleanupPolicy::OnCompletion => {
            if let Err(e) = tokio::fs::remove_dir_all(path).await {
                warn!(workspace = %path.display(), error = %e, "Failed to remove workspace");
            } else {
                debug!(workspace = %path.display(), "Removed workspace");
            }
        }
        CleanupPolicy::Retain => {
            debug!(workspace = %path.display(), "Retaining workspace");
        }
    }
}
