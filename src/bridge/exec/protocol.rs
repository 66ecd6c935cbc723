//! Wire protocol for the exec bridge (JSON text frames).
//!
//! - Client→Host: `{ "callback_id": 7, "service": "Media", "handle": "<uuid>", "action": "getCurrentPosition", "args": null }`
//!   (`callback_id` omitted for fire-and-forget calls, `handle` omitted for plugin-level calls)
//! - Host→Client: `{ "type": "result", "callback_id": 7, "status": "ok", "payload": 12.5 }`
//! - Host→Client: `{ "type": "event", "handle": "<uuid>", "event": { "type": "status", "code": 2 } }`

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bridge::{BridgeError, NativeEvent};

/// A call travelling from the application side to the native host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<u64>,
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<Uuid>,
    pub action: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Ok,
    Error,
}

/// Messages pushed from the native host to the application side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HostMessage {
    /// Settlement of a deferred call.
    #[serde(rename = "result")]
    Result {
        callback_id: u64,
        status: ResultStatus,
        #[serde(default)]
        payload: serde_json::Value,
    },
    /// Out-of-band push for one handle.
    #[serde(rename = "event")]
    Event { handle: Uuid, event: NativeEvent },
}

pub fn encode<T: Serialize>(msg: &T) -> Result<String, BridgeError> {
    serde_json::to_string(msg).map_err(|e| BridgeError::Protocol(e.to_string()))
}

pub fn decode_request(frame: &str) -> Result<ExecRequest, BridgeError> {
    serde_json::from_str(frame).map_err(|e| BridgeError::Protocol(e.to_string()))
}

pub fn decode_host_message(frame: &str) -> Result<HostMessage, BridgeError> {
    serde_json::from_str(frame).map_err(|e| BridgeError::Protocol(e.to_string()))
}
