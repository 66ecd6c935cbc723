//! Rover: plugin-level binding for the location tracking service.
//!
//! Unlike media there is no per-resource handle; every call targets the
//! service itself and settles once.

use std::sync::Arc;
use std::time::Duration;

use crate::bridge::{BridgeError, Invocation, NativeBridge, Target};
use crate::config::BridgeConfig;
use crate::error::ProxyError;

pub struct Rover {
    bridge: Arc<dyn NativeBridge>,
    service: String,
    timeout: Option<Duration>,
}

impl Rover {
    pub fn new(bridge: Arc<dyn NativeBridge>, config: &BridgeConfig) -> Self {
        Self {
            bridge,
            service: config.tracking_service.clone(),
            timeout: config.deferred_timeout(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.bridge.is_available(&self.service)
    }

    pub async fn start_tracking(&self) -> Result<(), ProxyError> {
        self.call("startTracking").await?;
        tracing::info!("Tracking started");
        Ok(())
    }

    pub async fn stop_tracking(&self) -> Result<(), ProxyError> {
        self.call("stopTracking").await?;
        tracing::info!("Tracking stopped");
        Ok(())
    }

    pub async fn is_tracking(&self) -> Result<bool, ProxyError> {
        let value = self.call("isTracking").await?;
        value
            .as_bool()
            .ok_or_else(|| ProxyError::Decode(format!("isTracking {}", value)))
    }

    async fn call(&self, action: &str) -> Result<serde_json::Value, ProxyError> {
        if !self.is_available() {
            return Err(ProxyError::Unavailable);
        }

        let pending = self
            .bridge
            .invoke_async(Target::Service(&self.service), Invocation::bare(action));

        let settled = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| ProxyError::Timeout)?,
            None => pending.await,
        };

        settled
            .map_err(|_| ProxyError::Bridge(BridgeError::Disconnected))?
            .map_err(ProxyError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{settled, Deferred, EventSink, NativeHandle, Subscription};
    use std::sync::Mutex;

    struct ScriptedBridge {
        available: bool,
        actions: Mutex<Vec<String>>,
        reply: serde_json::Value,
    }

    impl NativeBridge for ScriptedBridge {
        fn is_available(&self, service: &str) -> bool {
            self.available && service == "Rover"
        }

        fn create(&self, service: &str, _locator: &str) -> Result<NativeHandle, BridgeError> {
            Err(BridgeError::Unavailable(service.to_string()))
        }

        fn invoke_sync(&self, _target: Target<'_>, _call: Invocation) -> Result<(), BridgeError> {
            Ok(())
        }

        fn invoke_async(&self, target: Target<'_>, call: Invocation) -> Deferred {
            assert!(target.handle_id().is_none());
            self.actions.lock().unwrap().push(call.action);
            settled(Ok(self.reply.clone()))
        }

        fn on_event(&self, _handle: &NativeHandle, _sink: EventSink) -> Subscription {
            Subscription::detached()
        }
    }

    fn make_rover(available: bool, reply: serde_json::Value) -> (Rover, Arc<ScriptedBridge>) {
        let bridge = Arc::new(ScriptedBridge {
            available,
            actions: Mutex::new(Vec::new()),
            reply,
        });
        (Rover::new(bridge.clone(), &BridgeConfig::default()), bridge)
    }

    #[tokio::test]
    async fn test_start_and_stop_forward_to_service() {
        let (rover, bridge) = make_rover(true, serde_json::Value::Null);
        rover.start_tracking().await.unwrap();
        rover.stop_tracking().await.unwrap();
        assert_eq!(
            *bridge.actions.lock().unwrap(),
            vec!["startTracking", "stopTracking"]
        );
    }

    #[tokio::test]
    async fn test_unavailable_service() {
        let (rover, bridge) = make_rover(false, serde_json::Value::Null);
        assert_eq!(rover.start_tracking().await, Err(ProxyError::Unavailable));
        assert!(bridge.actions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_is_tracking_decodes_bool() {
        let (rover, _) = make_rover(true, serde_json::json!(true));
        assert_eq!(rover.is_tracking().await, Ok(true));

        let (rover, _) = make_rover(true, serde_json::json!("yes"));
        assert!(matches!(rover.is_tracking().await, Err(ProxyError::Decode(_))));
    }
}
