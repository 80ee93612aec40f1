//! Virtual display startup and readiness polling.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::Resolution;
use crate::models::display::DisplayReadinessState;
use crate::models::process::{ProcessHandle, ServiceKind};
use crate::orchestrator::spawner::{ProcessBackend, ProcessSpec};

/// Query answering whether the display accepts clients yet.
pub trait ReadinessProbe: Send + Sync {
    /// Run one readiness query against `display`.
    fn query<'a>(&'a self, display: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// [`ReadinessProbe`] that runs an X client (`xdpyinfo`) and checks its exit status.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
}

impl CommandProbe {
    /// Probe using `program -display <id>`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ReadinessProbe for CommandProbe {
    fn query<'a>(&'a self, display: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let status = Command::new(&self.program)
                .arg("-display")
                .arg(display)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status()
                .await;

            match status {
                Ok(status) => status.success(),
                Err(err) => {
                    debug!(program = %self.program, %err, "readiness probe failed to run");
                    false
                }
            }
        })
    }
}

/// Starts the virtual display server and waits for it to become queryable.
pub struct DisplaySessionManager {
    backend: Arc<dyn ProcessBackend>,
    probe: Arc<dyn ReadinessProbe>,
    program: String,
    display: String,
    poll_interval: Duration,
    max_attempts: u32,
    handle: Option<ProcessHandle>,
}

impl DisplaySessionManager {
    /// Construct a manager for `display` (does not start anything yet).
    #[must_use]
    pub fn new(
        backend: Arc<dyn ProcessBackend>,
        probe: Arc<dyn ReadinessProbe>,
        program: impl Into<String>,
        display: impl Into<String>,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            backend,
            probe,
            program: program.into(),
            display: display.into(),
            poll_interval,
            max_attempts,
            handle: None,
        }
    }

    /// Display identifier later components bind to.
    #[must_use]
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Handle of the display server process, once spawned.
    #[must_use]
    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.handle.as_ref()
    }

    /// Spawn the display server at `resolution` and poll until ready.
    ///
    /// Never fails: a spawn failure or an exhausted retry budget yields
    /// [`DisplayReadinessState::TimedOut`] and the caller continues degraded.
    pub async fn start(&mut self, resolution: Resolution) -> DisplayReadinessState {
        let span = info_span!("display", display = %self.display, %resolution);
        async move {
            let spec = ProcessSpec::new(&self.program).args([
                self.display.clone(),
                "-screen".into(),
                "0".into(),
                resolution.to_string(),
                "-nolisten".into(),
                "tcp".into(),
            ]);

            match self.backend.spawn(ServiceKind::Display, &spec).await {
                Ok(handle) => self.handle = Some(handle),
                Err(err) => warn!(%err, "display server failed to start"),
            }

            let state = self.wait_until_ready().await;
            if state == DisplayReadinessState::Ready {
                info!("display ready");
            } else {
                warn!(
                    attempts = self.max_attempts,
                    "display not ready within retry budget, continuing degraded"
                );
            }
            state
        }
        .instrument(span)
        .await
    }

    /// Poll the readiness probe at a fixed interval up to the attempt budget.
    pub async fn wait_until_ready(&self) -> DisplayReadinessState {
        let mut state = DisplayReadinessState::Waiting;

        for attempt in 1..=self.max_attempts {
            if self.probe.query(&self.display).await {
                debug!(attempt, "display answered readiness query");
                state = DisplayReadinessState::Ready;
                break;
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        if state.is_settled() {
            state
        } else {
            DisplayReadinessState::TimedOut
        }
    }
}
