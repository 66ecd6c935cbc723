//! Message-passing bridge modelled on the hybrid runtime's exec queue.
//!
//! The application side ([`ExecBridge`]) and the native side ([`NativeHost`])
//! exchange JSON frames over a pair of unbounded channels. Calls for the same
//! handle reach the host in issue order; deferred results come back tagged
//! with the callback id they answer.

pub mod client;
pub mod host;
pub mod protocol;

pub use client::ExecBridge;
pub use host::{EventQueue, HostConnection, NativeHost, NativePlugin, PluginCall, PluginResult};
pub use protocol::{ExecRequest, HostMessage, ResultStatus};
