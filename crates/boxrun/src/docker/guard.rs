//! Container ownership

use std::sync::Arc;

use tracing::{debug, warn};

use crate::docker::{ContainerId, ContainerRuntime, RuntimeError};

/// Owns a created container until it is removed
///
/// # Cleanup
///
/// Call [`release()`](Self::release) on every path. If the guard is dropped
/// without it (the owning future was cancelled, or a panic unwound), `Drop`
/// spawns a best-effort removal on the current tokio runtime.
#[derive(Debug)]
pub struct ContainerGuard {
    runtime: Arc<dyn ContainerRuntime>,
    id: ContainerId,
    released: bool,
}

impl ContainerGuard {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, id: ContainerId) -> Self {
        Self {
            runtime,
            id,
            released: false,
        }
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Force-remove the container
    ///
    /// A removal that fails is not retried.
    #[must_use = "release errors should be handled"]
    pub async fn release(mut self) -> Result<(), RuntimeError> {
        let result = self.runtime.remove(&self.id).await;
        self.released = true;
        result
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        warn!(
            container = %self.id,
            "container guard dropped without release, removing in background"
        );

        let runtime = Arc::clone(&self.runtime);
        let id = self.id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match runtime.remove(&id).await {
                        Ok(()) => debug!(container = %id, "background removal succeeded"),
                        Err(e) => {
                            warn!(container = %id, error = %e, "background removal failed")
                        }
                    }
                });
            }
            Err(_) => {
                warn!(container = %id, "no tokio runtime available, container leaked");
            }
        }
    }
}
