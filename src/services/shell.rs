//! Best-effort window manager launch.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::models::process::{ProcessHandle, ServiceKind};
use crate::orchestrator::spawner::{ProcessBackend, ProcessSpec};

/// Launches the window shell on the display and pauses for it to settle.
///
/// The shell only provides window decoration and focus; nothing depends on
/// it, so failures are not retried.
pub struct WindowShellLauncher {
    backend: Arc<dyn ProcessBackend>,
    program: String,
    warmup: Duration,
}

impl WindowShellLauncher {
    /// Construct a launcher for `program`.
    #[must_use]
    pub fn new(backend: Arc<dyn ProcessBackend>, program: impl Into<String>, warmup: Duration) -> Self {
        Self {
            backend,
            program: program.into(),
            warmup,
        }
    }

    /// Spawn the shell against `display_id`, then sleep for the warm-up period.
    pub async fn start(&self, display_id: &str) -> Option<ProcessHandle> {
        let spec = ProcessSpec::new(&self.program).on_display(display_id);
        let handle = match self.backend.spawn(ServiceKind::WindowShell, &spec).await {
            Ok(handle) => {
                info!(display = display_id, "window shell launched");
                Some(handle)
            }
            Err(err) => {
                debug!(%err, "window shell unavailable");
                None
            }
        };

        tokio::time::sleep(self.warmup).await;
        handle
    }
}
