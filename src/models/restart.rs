//! Relaunch counter shared between a supervisor and its observers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic count of relaunches of one supervised process.
///
/// Cloning shares the underlying counter. Used for observability only.
#[derive(Debug, Clone, Default)]
pub struct RestartCounter(Arc<AtomicU64>);

impl RestartCounter {
    /// Construct a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one relaunch and return the new total.
    #[must_use]
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current number of relaunches.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
