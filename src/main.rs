#![forbid(unsafe_code)]

//! `remote-browser`: session supervisor binary.
//!
//! Captures configuration once, then starts the virtual display, window
//! shell, remote-access server, controlled browser, and control-port
//! gateway, and keeps them running until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use remote_browser::config::SessionConfig;
use remote_browser::orchestrator::lifecycle::LifecycleOrchestrator;
use remote_browser::orchestrator::spawner::{ChildProcessBackend, ProcessBackend};
use remote_browser::services::display::{CommandProbe, ReadinessProbe};
use remote_browser::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "remote-browser", about = "Remote browser session supervisor", version, long_about = None)]
struct Cli {
    /// Optional TOML configuration file; environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("remote-browser supervisor bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = match &args.config {
        Some(path) => {
            let mut config = SessionConfig::load_from_path(path)?;
            config.apply_env(&std::env::vars().collect())?;
            config.validate()?;
            config
        }
        None => SessionConfig::from_env()?,
    };

    let config = Arc::new(config);
    info!(
        resolution = %config.resolution,
        display = %config.display,
        state_dir = %config.state_dir.display(),
        vnc_auth = config.vnc_password.is_some(),
        devtools_auth = config.devtools_token.is_some(),
        "configuration loaded"
    );

    // ── Start the session ───────────────────────────────
    let backend: Arc<dyn ProcessBackend> = Arc::new(ChildProcessBackend::new());
    let probe: Arc<dyn ReadinessProbe> =
        Arc::new(CommandProbe::new(&config.programs.display_probe));
    let orchestrator = LifecycleOrchestrator::new(Arc::clone(&config), backend, probe);

    let ct = CancellationToken::new();
    let session = tokio::spawn(orchestrator.run(ct.clone()));

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    if let Err(err) = session.await {
        tracing::error!(%err, "session task failed");
    }
    info!("remote-browser shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
