//! Session orchestration modules.
//!
//! Covers process spawning, controlled-application supervision, and the
//! startup sequence that ties every service together.

pub mod child_monitor;
pub mod lifecycle;
pub mod spawner;
