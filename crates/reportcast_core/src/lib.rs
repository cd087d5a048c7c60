//! REPORTCAST Core Types
//!
//! Identifiers, the shared error type, and proxy configuration.
//! No I/O beyond reading a config file on request.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod id;

// Re-exports
pub use config::{ConfigError, ProxyConfig};
pub use error::{CoreError, CoreResult};
pub use id::{LocalId, SessionId, SubscriberId};
