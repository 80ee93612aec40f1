//! Launchers for the display-side services the browser depends on.
//!
//! Only the controlled application is supervised; everything here is
//! started once and left running for the lifetime of the session.

pub mod display;
pub mod remote_access;
pub mod shell;
pub mod web_viewer;
