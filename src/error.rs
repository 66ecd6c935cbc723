use std::fmt;

use crate::bridge::{BridgeError, MediaError};

/// Error type for calls made through a plugin binding
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyError {
    /// The native service was missing when the binding was created
    Unavailable,
    /// The handle was already released
    Released,
    /// The native side rejected the call
    Native(MediaError),
    /// The bridge could not carry the call
    Bridge(BridgeError),
    /// No settlement within the configured deadline
    Timeout,
    /// The native result had an unexpected shape
    Decode(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "Native plugin not available"),
            Self::Released => write!(f, "Native handle already released"),
            Self::Native(err) => write!(f, "Native error: {}", err),
            Self::Bridge(err) => write!(f, "{}", err),
            Self::Timeout => write!(f, "Native call timed out"),
            Self::Decode(msg) => write!(f, "Unexpected native result: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<ProxyError> for String {
    fn from(err: ProxyError) -> Self {
        err.to_string()
    }
}

impl From<BridgeError> for ProxyError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Rejected(payload) => Self::Native(MediaError::from_payload(payload)),
            BridgeError::Unavailable(_) => Self::Unavailable,
            other => Self::Bridge(other),
        }
    }
}
