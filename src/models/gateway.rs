//! Gateway forwarding session record.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One relay between an accepted external connection and the internal
/// control port. Lives as long as the client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySession {
    /// Unique session identifier used in log correlation.
    pub id: String,
    /// Remote address of the external client.
    pub peer: SocketAddr,
    /// Accept timestamp.
    pub opened_at: DateTime<Utc>,
}

impl GatewaySession {
    /// Open a session record for a freshly accepted peer.
    #[must_use]
    pub fn open(peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            peer,
            opened_at: Utc::now(),
        }
    }
}
