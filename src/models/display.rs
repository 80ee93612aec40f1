//! Display readiness states.

use serde::{Deserialize, Serialize};

/// Readiness of the virtual display as observed by the readiness probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisplayReadinessState {
    /// Probing has not succeeded yet.
    Waiting,
    /// The display answered a readiness query.
    Ready,
    /// The retry budget ran out; startup continues degraded.
    TimedOut,
}

impl DisplayReadinessState {
    /// Whether the state is final.
    #[must_use]
    pub fn is_settled(self) -> bool {
        !matches!(self, Self::Waiting)
    }
}
