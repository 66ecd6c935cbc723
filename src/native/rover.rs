//! In-process stand-in for the Rover tracking plugin.

use serde_json::json;

use crate::bridge::exec::{EventQueue, NativePlugin, PluginCall, PluginResult};
use crate::bridge::MediaError;

#[derive(Debug)]
pub struct SimulatedRover {
    service: String,
    tracking: bool,
}

impl Default for SimulatedRover {
    fn default() -> Self {
        Self {
            service: "Rover".to_string(),
            tracking: false,
        }
    }
}

impl SimulatedRover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under a different service name.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }
}

impl NativePlugin for SimulatedRover {
    fn service(&self) -> &str {
        &self.service
    }

    fn execute(&mut self, call: PluginCall, _events: &mut EventQueue) -> PluginResult {
        match call.action.as_str() {
            "startTracking" => {
                if self.tracking {
                    tracing::debug!("Simulated rover: already tracking");
                }
                self.tracking = true;
                PluginResult::NoResult
            }
            "stopTracking" => {
                self.tracking = false;
                PluginResult::NoResult
            }
            "isTracking" => PluginResult::Ok(json!(self.tracking)),
            other => PluginResult::error(MediaError::aborted(format!("Unknown rover action '{}'", other))),
        }
    }
}
