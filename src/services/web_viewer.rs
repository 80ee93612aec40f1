//! Browser-based framebuffer viewer bridge.
//!
//! Serves the static noVNC client and proxies its WebSocket traffic to the
//! remote-framebuffer port. Started once, never monitored.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::models::process::{ProcessHandle, ServiceKind};
use crate::orchestrator::spawner::{ProcessBackend, ProcessSpec};

/// Build the bridge invocation: `websockify --web <root> <listen> localhost:<vnc>`.
#[must_use]
pub fn bridge_spec(program: &str, web_root: &Path, listen_port: u16, vnc_port: u16) -> ProcessSpec {
    ProcessSpec::new(program).args([
        "--web".to_owned(),
        web_root.display().to_string(),
        listen_port.to_string(),
        format!("localhost:{vnc_port}"),
    ])
}

/// Launch the bridge. Failure only removes the web viewer.
pub async fn start(
    backend: &Arc<dyn ProcessBackend>,
    program: &str,
    web_root: &Path,
    listen_port: u16,
    vnc_port: u16,
) -> Option<ProcessHandle> {
    let spec = bridge_spec(program, web_root, listen_port, vnc_port);
    match backend.spawn(ServiceKind::WebViewer, &spec).await {
        Ok(handle) => {
            info!(port = listen_port, "web viewer bridge started");
            Some(handle)
        }
        Err(err) => {
            warn!(%err, "web viewer bridge failed to start");
            None
        }
    }
}
