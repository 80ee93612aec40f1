//! Session lifecycle orchestration.
//!
//! Starts every component in dependency order: display, window shell,
//! remote access (plus the optional web viewer), controlled application
//! with its monitor, and finally the gateway. Each stage either starts its
//! component and moves on or, for the display only, logs a degraded warning
//! and moves on anyway. Nothing is retried at this level.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::SessionConfig;
use crate::gateway::{BasicAuthorizer, ConnectionAuthorizer, DebugPortGateway};
use crate::models::display::DisplayReadinessState;
use crate::models::lifecycle::LifecycleStage;
use crate::models::restart::RestartCounter;
use crate::orchestrator::child_monitor::{ApplicationLaunch, ApplicationSupervisor};
use crate::orchestrator::spawner::ProcessBackend;
use crate::services::display::{DisplaySessionManager, ReadinessProbe};
use crate::services::remote_access::RemoteAccessServer;
use crate::services::shell::WindowShellLauncher;
use crate::services::web_viewer;

/// Capability lost to a fatal startup failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Remote-framebuffer viewing.
    RemoteAccess,
    /// External control-port access.
    Gateway,
}

/// Background activity of a started session.
#[derive(Debug)]
pub struct RunningSession {
    /// Outcome of the display readiness poll.
    pub display: DisplayReadinessState,
    /// Relaunch counter of the controlled application.
    pub restarts: RestartCounter,
    /// Bound gateway address, if the gateway started.
    pub gateway_addr: Option<SocketAddr>,
    /// Capabilities permanently unavailable for this session.
    pub unavailable: Vec<Capability>,
    monitor: JoinHandle<()>,
    gateway: Option<JoinHandle<()>>,
}

impl RunningSession {
    /// Wait for the monitor and gateway tasks to finish.
    ///
    /// The tasks only finish after their cancellation token fires.
    pub async fn join(self) {
        if let Err(err) = self.monitor.await {
            error!(%err, "application monitor task failed");
        }
        if let Some(gateway) = self.gateway {
            if let Err(err) = gateway.await {
                error!(%err, "gateway task failed");
            }
        }
    }
}

/// Sequences component startup and owns the session's stage.
pub struct LifecycleOrchestrator {
    config: Arc<SessionConfig>,
    backend: Arc<dyn ProcessBackend>,
    probe: Arc<dyn ReadinessProbe>,
    stage: watch::Sender<LifecycleStage>,
}

impl LifecycleOrchestrator {
    /// Construct an orchestrator in the `Init` stage.
    #[must_use]
    pub fn new(
        config: Arc<SessionConfig>,
        backend: Arc<dyn ProcessBackend>,
        probe: Arc<dyn ReadinessProbe>,
    ) -> Self {
        let (stage, _) = watch::channel(LifecycleStage::Init);
        Self {
            config,
            backend,
            probe,
            stage,
        }
    }

    /// Current stage.
    #[must_use]
    pub fn stage(&self) -> LifecycleStage {
        *self.stage.borrow()
    }

    /// Observe stage changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleStage> {
        self.stage.subscribe()
    }

    fn advance(&self, next: LifecycleStage) {
        let current = self.stage();
        if !current.can_transition_to(next) {
            warn!(?current, ?next, "unexpected lifecycle transition");
        }
        info!(stage = ?next, "lifecycle stage");
        self.stage.send_replace(next);
    }

    /// Start every component in order and return once the session is `Running`.
    pub async fn start(&self, cancel: &CancellationToken) -> RunningSession {
        let config = &self.config;
        let timings = &config.timings;
        let mut unavailable = Vec::new();

        // ── Display ─────────────────────────────────────
        self.advance(LifecycleStage::DisplayStarting);
        let mut display_manager = DisplaySessionManager::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.probe),
            &config.programs.display_server,
            &config.display,
            timings.display_poll_interval(),
            timings.display_poll_attempts,
        );
        let display = display_manager.start(config.resolution).await;
        if display == DisplayReadinessState::Ready {
            self.advance(LifecycleStage::DisplayReady);
        } else {
            self.advance(LifecycleStage::DisplayDegraded);
        }
        let display_id = display_manager.display().to_owned();

        // ── Window shell ────────────────────────────────
        self.advance(LifecycleStage::ShellStarting);
        WindowShellLauncher::new(
            Arc::clone(&self.backend),
            &config.programs.window_shell,
            timings.shell_warmup(),
        )
        .start(&display_id)
        .await;

        // ── Remote access ───────────────────────────────
        self.advance(LifecycleStage::AccessServerStarting);
        let remote_access = RemoteAccessServer::new(
            Arc::clone(&self.backend),
            &config.programs.remote_access,
            config.vnc_port,
            &config.vnc_password_file,
            timings.bind_check_attempts,
            timings.bind_check_interval(),
        );
        if let Err(err) = remote_access
            .start(&display_id, config.vnc_password.as_deref())
            .await
        {
            error!(%err, "remote access unavailable for this session");
            unavailable.push(Capability::RemoteAccess);
        }

        if config.web_viewer_enabled() {
            web_viewer::start(
                &self.backend,
                &config.programs.web_viewer,
                &config.programs.web_viewer_root,
                config.web_proxy_port,
                config.vnc_port,
            )
            .await;
        }

        // ── Controlled application ──────────────────────
        self.advance(LifecycleStage::ApplicationStarting);
        let mut supervisor = ApplicationSupervisor::new(
            Arc::clone(&self.backend),
            ApplicationLaunch::from_config(config),
            timings.monitor_interval(),
            timings.restart_cooldown(),
        );
        if let Err(err) = supervisor.launch().await {
            // The monitor treats a missing handle as a crash and relaunches.
            error!(%err, "initial application launch failed");
        }
        let restarts = supervisor.restarts();

        self.advance(LifecycleStage::ApplicationMonitoring);
        let monitor = supervisor.spawn_monitor(cancel.clone());

        // ── Gateway ─────────────────────────────────────
        self.advance(LifecycleStage::GatewayStarting);
        let authorizer = config
            .devtools_token
            .as_deref()
            .map(|token| Arc::new(BasicAuthorizer::new(token)) as Arc<dyn ConnectionAuthorizer>);
        let (gateway, gateway_addr) = match DebugPortGateway::bind(
            config.external_debug_port,
            config.internal_debug_port,
            authorizer,
        )
        .await
        {
            Ok(gateway) => {
                let addr = gateway.local_addr().ok();
                (Some(gateway.spawn(cancel.clone())), addr)
            }
            Err(err) => {
                error!(%err, "control port gateway unavailable for this session");
                unavailable.push(Capability::Gateway);
                (None, None)
            }
        };

        self.advance(LifecycleStage::Running);
        RunningSession {
            display,
            restarts,
            gateway_addr,
            unavailable,
            monitor,
            gateway,
        }
    }

    /// Start the session and keep it running until `cancel` fires.
    ///
    /// No per-child graceful shutdown is attempted; managed processes are
    /// torn down with their owning backend.
    pub async fn run(self, cancel: CancellationToken) {
        let span = info_span!("session", display = %self.config.display);
        async move {
            let session = self.start(&cancel).await;
            info!(
                display = ?session.display,
                gateway = ?session.gateway_addr,
                unavailable = ?session.unavailable,
                "session running"
            );

            cancel.cancelled().await;
            session.join().await;
            info!("session stopped");
        }
        .instrument(span)
        .await;
    }
}
