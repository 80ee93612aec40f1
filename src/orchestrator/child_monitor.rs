//! Controlled application supervisor: launch, liveness polling, relaunch.
//!
//! Every [`monitor_interval`](crate::config::TimingsConfig::monitor_interval)
//! the supervisor checks whether its recorded handle is still alive. A dead
//! or missing handle triggers a fixed cooldown followed by a relaunch with
//! the same arguments. There is no restart ceiling and no backoff: a crash
//! loop restarts forever at the same cadence. The loop only stops when its
//! `CancellationToken` fires.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{Resolution, SessionConfig};
use crate::models::process::{ProcessHandle, ServiceKind};
use crate::models::restart::RestartCounter;
use crate::orchestrator::spawner::{ProcessBackend, ProcessSpec};
use crate::{AppError, Result};

/// Loopback address the control protocol is restricted to.
pub const LOOPBACK: &str = "127.0.0.1";

/// Everything needed to (re)launch the controlled browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationLaunch {
    /// Browser executable.
    pub program: String,
    /// X display the browser renders to.
    pub display: String,
    /// Persistent profile directory.
    pub state_dir: PathBuf,
    /// Loopback-only control port.
    pub internal_port: u16,
    /// Initial window geometry.
    pub resolution: Resolution,
    /// Extra arguments appended after the managed flags.
    pub extra_args: Vec<String>,
}

impl ApplicationLaunch {
    /// Derive launch parameters from the session configuration.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            program: config.programs.browser.clone(),
            display: config.display.clone(),
            state_dir: config.state_dir.clone(),
            internal_port: config.internal_debug_port,
            resolution: config.resolution,
            extra_args: config.programs.browser_args.clone(),
        }
    }

    /// Build the browser invocation.
    ///
    /// The control endpoint binds to loopback only; external exposure is the
    /// gateway's job.
    #[must_use]
    pub fn spec(&self) -> ProcessSpec {
        ProcessSpec::new(&self.program)
            .on_display(&self.display)
            .args([
                format!("--remote-debugging-address={LOOPBACK}"),
                format!("--remote-debugging-port={}", self.internal_port),
                format!("--user-data-dir={}", self.state_dir.display()),
                "--no-first-run".to_owned(),
                "--no-default-browser-check".to_owned(),
                // Stay alive with zero windows; the blank page below reopens one.
                "--keep-alive-for-test".to_owned(),
                "--disable-background-timer-throttling".to_owned(),
                "--disable-backgrounding-occluded-windows".to_owned(),
                "--disable-renderer-backgrounding".to_owned(),
                format!(
                    "--window-size={},{}",
                    self.resolution.width, self.resolution.height
                ),
                "--window-position=0,0".to_owned(),
            ])
            .args(self.extra_args.iter().cloned())
            .arg("about:blank")
    }
}

/// Result of one supervision tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The application is running; nothing done.
    Alive,
    /// The application was dead and has been relaunched.
    Relaunched {
        /// Relaunch total after this one.
        restarts: u64,
    },
    /// The application was dead and the relaunch failed; retried next tick.
    RelaunchFailed,
    /// Cancellation arrived during the cooldown.
    Cancelled,
}

/// Launches the controlled browser and keeps it running.
pub struct ApplicationSupervisor {
    backend: Arc<dyn ProcessBackend>,
    launch: ApplicationLaunch,
    monitor_interval: Duration,
    restart_cooldown: Duration,
    handle: Option<ProcessHandle>,
    restarts: RestartCounter,
}

impl ApplicationSupervisor {
    /// Construct a supervisor (does not launch yet).
    #[must_use]
    pub fn new(
        backend: Arc<dyn ProcessBackend>,
        launch: ApplicationLaunch,
        monitor_interval: Duration,
        restart_cooldown: Duration,
    ) -> Self {
        Self {
            backend,
            launch,
            monitor_interval,
            restart_cooldown,
            handle: None,
            restarts: RestartCounter::new(),
        }
    }

    /// Shared relaunch counter.
    #[must_use]
    pub fn restarts(&self) -> RestartCounter {
        self.restarts.clone()
    }

    /// Currently recorded process handle.
    #[must_use]
    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.handle.as_ref()
    }

    /// Launch parameters in use.
    #[must_use]
    pub fn launch_params(&self) -> &ApplicationLaunch {
        &self.launch
    }

    /// Start the application and record its handle.
    ///
    /// The profile directory is created if missing; an existing directory
    /// is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the profile directory cannot be created, or
    /// `AppError::Spawn` if the browser fails to start.
    pub async fn launch(&mut self) -> Result<ProcessHandle> {
        ensure_state_dir(&self.launch.state_dir)?;

        let handle = self
            .backend
            .spawn(ServiceKind::Application, &self.launch.spec())
            .await?;
        info!(
            pid = handle.pid.unwrap_or(0),
            port = self.launch.internal_port,
            state_dir = %self.launch.state_dir.display(),
            "application launched"
        );
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Run one liveness check, relaunching after the cooldown if needed.
    pub async fn tick(&mut self, cancel: &CancellationToken) -> TickOutcome {
        if let Some(handle) = &self.handle {
            if self.backend.is_alive(handle).await {
                return TickOutcome::Alive;
            }
            warn!(pid = handle.pid.unwrap_or(0), "application is not running");
        } else {
            warn!("application handle missing");
        }
        self.handle = None;

        tokio::select! {
            () = cancel.cancelled() => return TickOutcome::Cancelled,
            () = tokio::time::sleep(self.restart_cooldown) => {}
        }

        match self.launch().await {
            Ok(_) => {
                let restarts = self.restarts.increment();
                info!(restarts, "application relaunched");
                TickOutcome::Relaunched { restarts }
            }
            Err(err) => {
                error!(%err, "application relaunch failed");
                TickOutcome::RelaunchFailed
            }
        }
    }

    /// Poll forever until `cancel` fires.
    pub async fn monitor(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("application monitor shutting down");
                    break;
                }
                () = tokio::time::sleep(self.monitor_interval) => {}
            }

            if self.tick(&cancel).await == TickOutcome::Cancelled {
                info!("application monitor shutting down");
                break;
            }
        }
    }

    /// Spawn [`monitor`](Self::monitor) as a background task.
    #[must_use]
    pub fn spawn_monitor(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(
            self.monitor(cancel)
                .instrument(info_span!("application_monitor")),
        )
    }
}

/// Create the profile directory if it does not exist yet.
fn ensure_state_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|err| {
        AppError::Io(format!(
            "cannot create state directory {}: {err}",
            dir.display()
        ))
    })
}
