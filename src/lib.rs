#![forbid(unsafe_code)]

//! Supervisor for an isolated, remotely-controllable browser session.

pub mod config;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod services;

pub use config::SessionConfig;
pub use errors::{AppError, Result};
