//! Remote-framebuffer (VNC) server launch and credential storage.
//!
//! With a password configured, the hashed password is written to an
//! owner-only file using the server's own `-storepasswd` mode, and the
//! server is started with `-rfbauth`. Without one, the server runs with
//! `-nopw`. Both modes use `-shared` (concurrent viewers) and `-forever`
//! (survive viewer disconnects).

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::process::Command;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::models::process::{ProcessHandle, ServiceKind};
use crate::orchestrator::spawner::{ProcessBackend, ProcessSpec};
use crate::{AppError, Result};

/// Build the server invocation for `display`.
///
/// `password_file` selects authenticated mode.
#[must_use]
pub fn server_spec(
    program: &str,
    display: &str,
    port: u16,
    password_file: Option<&Path>,
) -> ProcessSpec {
    let spec = ProcessSpec::new(program).args([
        "-display".to_owned(),
        display.to_owned(),
        "-forever".to_owned(),
        "-shared".to_owned(),
        "-rfbport".to_owned(),
        port.to_string(),
    ]);

    match password_file {
        Some(path) => spec.arg("-rfbauth").arg(path.display().to_string()),
        None => spec.arg("-nopw"),
    }
}

/// Persist the hashed form of `secret` to `path` with owner-only access.
///
/// The parent directory is created with mode `0700` if missing. The file is
/// pre-created with mode `0600`, filled by `<program> -storepasswd`, and its
/// mode is enforced again afterwards.
///
/// # Errors
///
/// Returns `AppError::Credential` if the directory, file, or storage command fails.
pub async fn persist_credential(program: &str, secret: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_private_dir(parent)?;
    }
    create_private_file(path)?;

    let output = Command::new(program)
        .arg("-storepasswd")
        .arg(secret)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| AppError::Credential(format!("failed to run {program}: {err}")))?;

    if !output.status.success() {
        return Err(AppError::Credential(format!(
            "{program} -storepasswd failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    restrict_to_owner(path)?;
    debug!(path = %path.display(), "remote access credential stored");
    Ok(())
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(|err| AppError::Credential(format!("cannot create {}: {err}", dir.display())))
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .map_err(|err| AppError::Credential(format!("cannot create {}: {err}", dir.display())))
}

#[cfg(unix)]
fn create_private_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map(drop)
        .map_err(|err| AppError::Credential(format!("cannot create {}: {err}", path.display())))
}

#[cfg(not(unix))]
fn create_private_file(path: &Path) -> Result<()> {
    std::fs::File::create(path)
        .map(drop)
        .map_err(|err| AppError::Credential(format!("cannot create {}: {err}", path.display())))
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|err| AppError::Credential(format!("cannot restrict {}: {err}", path.display())))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}

/// Starts the remote-framebuffer server and confirms it is listening.
pub struct RemoteAccessServer {
    backend: Arc<dyn ProcessBackend>,
    program: String,
    port: u16,
    password_file: PathBuf,
    bind_check_attempts: u32,
    bind_check_interval: Duration,
}

impl RemoteAccessServer {
    /// Construct a server launcher.
    #[must_use]
    pub fn new(
        backend: Arc<dyn ProcessBackend>,
        program: impl Into<String>,
        port: u16,
        password_file: impl Into<PathBuf>,
        bind_check_attempts: u32,
        bind_check_interval: Duration,
    ) -> Self {
        Self {
            backend,
            program: program.into(),
            port,
            password_file: password_file.into(),
            bind_check_attempts,
            bind_check_interval,
        }
    }

    /// Start the server on `display`, authenticated when `credential` is set.
    ///
    /// # Errors
    ///
    /// - `AppError::Credential` if the password cannot be stored.
    /// - `AppError::Spawn` if the server cannot be started.
    /// - `AppError::Bind` if the port is already taken or the server exits
    ///   before its port opens.
    pub async fn start(&self, display: &str, credential: Option<&str>) -> Result<ProcessHandle> {
        let span = info_span!("remote_access", port = self.port);
        async move {
            let password_file = match credential {
                Some(secret) => {
                    persist_credential(&self.program, secret, &self.password_file).await?;
                    Some(self.password_file.as_path())
                }
                None => None,
            };

            self.ensure_port_free().await?;
            let spec = server_spec(&self.program, display, self.port, password_file);
            let handle = self.backend.spawn(ServiceKind::RemoteAccess, &spec).await?;
            self.wait_for_bind(&handle).await?;

            if password_file.is_some() {
                info!("remote access server started with password authentication");
            } else {
                info!("remote access server started without authentication");
            }
            Ok(handle)
        }
        .instrument(span)
        .await
    }

    /// Fail early when another process already holds the port.
    async fn ensure_port_free(&self) -> Result<()> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.port))
            .await
            .map_err(|err| {
                AppError::Bind(format!(
                    "remote access port {} is unavailable: {err}",
                    self.port
                ))
            })?;
        drop(listener);
        Ok(())
    }

    /// Poll until the port accepts connections or the process dies.
    ///
    /// A connection only counts while the server process is still alive, so
    /// a foreign listener on the port cannot mask a server that exited.
    async fn wait_for_bind(&self, handle: &ProcessHandle) -> Result<()> {
        for _ in 0..self.bind_check_attempts {
            self.ensure_alive(handle).await?;
            if TcpStream::connect((Ipv4Addr::LOCALHOST, self.port)).await.is_ok() {
                return self.ensure_alive(handle).await;
            }
            tokio::time::sleep(self.bind_check_interval).await;
        }

        self.ensure_alive(handle).await?;
        warn!(
            port = self.port,
            "remote access port not confirmed open, continuing"
        );
        Ok(())
    }

    async fn ensure_alive(&self, handle: &ProcessHandle) -> Result<()> {
        if self.backend.is_alive(handle).await {
            Ok(())
        } else {
            Err(AppError::Bind(format!(
                "remote access server exited before listening on port {}",
                self.port
            )))
        }
    }
}
