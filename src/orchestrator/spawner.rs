//! Managed process spawner.
//!
//! [`ProcessBackend`] is the narrow seam between the supervisor logic and
//! the operating system: `spawn`, `is_alive`, `terminate`. The production
//! implementation, [`ChildProcessBackend`], keeps every spawned
//! `tokio::process::Child` in a registry keyed by handle id. Children are
//! spawned with `kill_on_drop(true)` so dropping the backend tears the whole
//! session down.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::process::{ProcessHandle, ServiceKind};
use crate::{AppError, Result};

/// Grace period between a polite termination request and a forced kill.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Program, arguments, and extra environment for one managed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Executable name or path.
    pub program: String,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Variables added to the inherited environment.
    pub env: Vec<(String, String)>,
}

impl ProcessSpec {
    /// Start a spec for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Bind the process to an X display.
    #[must_use]
    pub fn on_display(self, display: &str) -> Self {
        self.env("DISPLAY", display)
    }
}

/// Operating-system process management used by every service.
pub trait ProcessBackend: Send + Sync {
    /// Start a long-running process for `service`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`] if the process cannot be started.
    fn spawn(
        &self,
        service: ServiceKind,
        spec: &ProcessSpec,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessHandle>> + Send + '_>>;

    /// Whether `handle` still refers to a running process.
    ///
    /// Unknown or already-reaped handles report `false`.
    fn is_alive<'a>(
        &'a self,
        handle: &'a ProcessHandle,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

    /// Stop the process behind `handle` and forget it.
    ///
    /// Terminating an unknown handle is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the process could not be signalled.
    fn terminate<'a>(
        &'a self,
        handle: &'a ProcessHandle,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Shared registry of live child processes keyed by handle id.
pub type ActiveChildren = Arc<Mutex<HashMap<String, Child>>>;

/// [`ProcessBackend`] backed by `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct ChildProcessBackend {
    children: ActiveChildren,
}

impl ChildProcessBackend {
    /// Construct an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of children currently tracked.
    pub async fn tracked(&self) -> usize {
        self.children.lock().await.len()
    }
}

impl ProcessBackend for ChildProcessBackend {
    fn spawn(
        &self,
        service: ServiceKind,
        spec: &ProcessSpec,
    ) -> Pin<Box<dyn Future<Output = Result<ProcessHandle>> + Send + '_>> {
        let spec = spec.clone();
        Box::pin(async move {
            let mut cmd = Command::new(&spec.program);
            cmd.args(&spec.args)
                .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .stdin(Stdio::null())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .kill_on_drop(true);

            let child = cmd.spawn().map_err(|err| {
                AppError::Spawn(format!("failed to spawn {service} ({}): {err}", spec.program))
            })?;

            let handle = ProcessHandle::new(service, child.id());
            info!(
                %service,
                pid = handle.pid.unwrap_or(0),
                program = %spec.program,
                "process spawned"
            );

            self.children.lock().await.insert(handle.id.clone(), child);
            Ok(handle)
        })
    }

    fn is_alive<'a>(
        &'a self,
        handle: &'a ProcessHandle,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let mut guard = self.children.lock().await;
            let Some(child) = guard.get_mut(&handle.id) else {
                return false;
            };

            match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    debug!(service = %handle.service, %status, "process exited");
                    guard.remove(&handle.id);
                    false
                }
                Err(err) => {
                    warn!(service = %handle.service, %err, "failed to poll process status");
                    // Treat as exited to clean up the dead entry.
                    guard.remove(&handle.id);
                    false
                }
            }
        })
    }

    fn terminate<'a>(
        &'a self,
        handle: &'a ProcessHandle,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            // Take the child out before awaiting so other callers are not blocked.
            let Some(mut child) = self.children.lock().await.remove(&handle.id) else {
                return Ok(());
            };

            request_exit(&mut child);

            match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    info!(service = %handle.service, %status, "process terminated");
                    Ok(())
                }
                Ok(Err(err)) => Err(AppError::Io(format!(
                    "failed waiting for {} to exit: {err}",
                    handle.service
                ))),
                Err(_) => {
                    warn!(
                        service = %handle.service,
                        "process did not exit within grace period, forcing kill"
                    );
                    child.kill().await.map_err(|err| {
                        AppError::Io(format!("failed to kill {}: {err}", handle.service))
                    })
                }
            }
        })
    }
}

/// Ask the child to exit with `SIGTERM`.
#[cfg(unix)]
fn request_exit(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(pid, %err, "SIGTERM delivery failed");
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!(%err, "kill request failed");
    }
}
