//! Managed process identity.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Service a managed process belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Virtual display server.
    Display,
    /// Window manager.
    WindowShell,
    /// Remote-framebuffer server.
    RemoteAccess,
    /// Browser-based viewer bridge.
    WebViewer,
    /// Controlled browser.
    Application,
}

impl Display for ServiceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Display => "display",
            Self::WindowShell => "window_shell",
            Self::RemoteAccess => "remote_access",
            Self::WebViewer => "web_viewer",
            Self::Application => "application",
        };
        f.write_str(name)
    }
}

/// Opaque reference to a process started through a
/// [`ProcessBackend`](crate::orchestrator::spawner::ProcessBackend).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessHandle {
    /// Backend-unique handle identifier.
    pub id: String,
    /// Operating-system process id, when the backend knows it.
    pub pid: Option<u32>,
    /// Owning service.
    pub service: ServiceKind,
    /// Spawn timestamp.
    pub started_at: DateTime<Utc>,
}

impl ProcessHandle {
    /// Construct a handle with a generated identifier stamped now.
    #[must_use]
    pub fn new(service: ServiceKind, pid: Option<u32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pid,
            service,
            started_at: Utc::now(),
        }
    }
}
