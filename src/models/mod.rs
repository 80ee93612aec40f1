//! Domain model module declarations.

pub mod display;
pub mod gateway;
pub mod lifecycle;
pub mod process;
pub mod restart;
