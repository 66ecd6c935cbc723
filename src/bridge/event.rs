//! Status codes, error shape, and the typed events pushed across the bridge.
//!
//! The numeric values are part of the contract with native plugins and with
//! any consumer that compares against the raw constants, so they are
//! serialized as plain integers and decoding rejects anything outside the
//! known sets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a native media resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MediaStatus {
    None = 0,
    Starting = 1,
    Running = 2,
    Paused = 3,
    Stopped = 4,
}

impl MediaStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MediaStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Starting),
            2 => Ok(Self::Running),
            3 => Ok(Self::Paused),
            4 => Ok(Self::Stopped),
            other => Err(format!("unknown media status code {}", other)),
        }
    }
}

impl From<MediaStatus> for u8 {
    fn from(status: MediaStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// Fault categories reported by the native media layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MediaErrorCode {
    Aborted = 1,
    Network = 2,
    Decode = 3,
    NoneSupported = 4,
}

impl MediaErrorCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MediaErrorCode {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Aborted),
            2 => Ok(Self::Network),
            3 => Ok(Self::Decode),
            4 => Ok(Self::NoneSupported),
            other => Err(format!("unknown media error code {}", other)),
        }
    }
}

impl From<MediaErrorCode> for u8 {
    fn from(code: MediaErrorCode) -> Self {
        code.code()
    }
}

/// Error payload in the `{ message, code }` shape native plugins use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaError {
    pub message: String,
    pub code: MediaErrorCode,
}

impl MediaError {
    pub fn new(code: MediaErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(MediaErrorCode::Aborted, message)
    }

    /// Interpret a native rejection payload. Anything that is not a
    /// well-formed `{ message, code }` object is reported as aborted with
    /// the raw payload as message.
    pub fn from_payload(payload: serde_json::Value) -> Self {
        match serde_json::from_value::<MediaError>(payload.clone()) {
            Ok(err) => err,
            Err(_) => {
                let message = match payload {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                Self::aborted(message)
            }
        }
    }
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code.code())
    }
}

impl std::error::Error for MediaError {}

/// Out-of-band notification pushed by the native side for one handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NativeEvent {
    Status { code: MediaStatus },
    Duration { seconds: f64 },
    Position { seconds: f64 },
    Error { error: MediaError },
    /// The current play, record, or stop action finished.
    Completed,
}
