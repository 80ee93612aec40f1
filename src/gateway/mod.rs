//! Control-port gateway.
//!
//! Exposes the loopback-only control port on an external port. The relay
//! is a plain bidirectional byte pipe; an optional [`ConnectionAuthorizer`]
//! runs before any upstream connection is opened.

pub mod auth;
pub mod relay;
pub mod server;

pub use auth::BasicAuthorizer;
pub use relay::{AuthDecision, ConnectionAuthorizer};
pub use server::DebugPortGateway;
