//! Orchestrator lifecycle stages and transition rules.

use serde::{Deserialize, Serialize};

/// Startup stage of the session orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    /// Nothing started yet.
    Init,
    /// Display server spawned; probing readiness.
    DisplayStarting,
    /// Display answered a readiness query.
    DisplayReady,
    /// Display never answered; continuing anyway.
    DisplayDegraded,
    /// Window shell launching.
    ShellStarting,
    /// Remote-access server (and optional web viewer) launching.
    AccessServerStarting,
    /// Controlled application launching.
    ApplicationStarting,
    /// Application monitor running.
    ApplicationMonitoring,
    /// Gateway binding its listener.
    GatewayStarting,
    /// Everything started; terminal until process termination.
    Running,
}

impl LifecycleStage {
    /// Determine whether a stage transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::DisplayStarting)
                | (
                    Self::DisplayStarting,
                    Self::DisplayReady | Self::DisplayDegraded
                )
                | (
                    Self::DisplayReady | Self::DisplayDegraded,
                    Self::ShellStarting
                )
                | (Self::ShellStarting, Self::AccessServerStarting)
                | (Self::AccessServerStarting, Self::ApplicationStarting)
                | (Self::ApplicationStarting, Self::ApplicationMonitoring)
                | (Self::ApplicationMonitoring, Self::GatewayStarting)
                | (Self::GatewayStarting, Self::Running)
        )
    }
}
