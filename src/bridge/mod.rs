//! Bridge abstraction between application code and native plugins.
//!
//! A binding never talks to a native plugin directly. It is handed a
//! [`NativeBridge`] and forwards every operation through it:
//! - `invoke_sync`: fire-and-forget, effects observed only through events
//! - `invoke_async`: deferred, settles exactly once through a [`Deferred`]
//! - `on_event`: typed subscription to the pushes for one handle
//!
//! The exec implementation in [`exec`] carries these calls as JSON messages
//! to a [`exec::NativeHost`]. Tests may provide their own bridge.

pub mod event;
pub mod exec;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

pub use event::{MediaError, MediaErrorCode, MediaStatus, NativeEvent};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// The named native service is not present in the host.
    Unavailable(String),
    /// The native side went away before the call could be delivered or settled.
    Disconnected,
    /// A message could not be encoded or decoded.
    Protocol(String),
    /// The native side rejected the call with this payload.
    Rejected(serde_json::Value),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(service) => write!(f, "Native service '{}' is not available", service),
            Self::Disconnected => write!(f, "Native bridge disconnected"),
            Self::Protocol(msg) => write!(f, "Bridge protocol error: {}", msg),
            Self::Rejected(payload) => write!(f, "Native call rejected: {}", payload),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<BridgeError> for String {
    fn from(err: BridgeError) -> Self {
        err.to_string()
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Opaque reference to one native-side resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeHandle {
    pub service: String,
    pub id: Uuid,
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.service, self.id)
    }
}

/// What an invocation is addressed to.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// Plugin-level call with no resource instance behind it.
    Service(&'a str),
    Handle(&'a NativeHandle),
}

impl Target<'_> {
    pub fn service(&self) -> &str {
        match self {
            Target::Service(service) => service,
            Target::Handle(handle) => &handle.service,
        }
    }

    pub fn handle_id(&self) -> Option<Uuid> {
        match self {
            Target::Service(_) => None,
            Target::Handle(handle) => Some(handle.id),
        }
    }
}

/// A named request and its JSON arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub action: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl Invocation {
    pub fn new(action: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            action: action.into(),
            args,
        }
    }

    pub fn bare(action: impl Into<String>) -> Self {
        Self::new(action, serde_json::Value::Null)
    }
}

/// Result of a deferred call. The sender side is dropped or used exactly once.
pub type Deferred = oneshot::Receiver<Result<serde_json::Value, BridgeError>>;

/// Build a [`Deferred`] that is already settled.
pub fn settled(result: Result<serde_json::Value, BridgeError>) -> Deferred {
    let (tx, rx) = oneshot::channel();
    let _ = tx.send(result);
    rx
}

/// Receiver for the events of one handle.
pub type EventSink = Arc<dyn Fn(NativeEvent) + Send + Sync>;

/// Live event subscription. Cancelling (or dropping) detaches the sink.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to detach.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Trait for bridge implementations that carry calls to native plugins
pub trait NativeBridge: Send + Sync {
    /// Check whether a native service exists in the host
    fn is_available(&self, service: &str) -> bool;

    /// Allocate a native resource. Returns as soon as the request is queued.
    fn create(&self, service: &str, locator: &str) -> Result<NativeHandle, BridgeError>;

    /// Forward a call that produces no result
    fn invoke_sync(&self, target: Target<'_>, call: Invocation) -> Result<(), BridgeError>;

    /// Forward a call whose result arrives later, exactly once
    fn invoke_async(&self, target: Target<'_>, call: Invocation) -> Deferred;

    /// Attach the sink that receives pushes for `handle`
    fn on_event(&self, handle: &NativeHandle, sink: EventSink) -> Subscription;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscription_cancels_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let sub = Subscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        sub.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_cancels_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        {
            let _sub = Subscription::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_settled_deferred_resolves() {
        let value = settled(Ok(serde_json::json!(3))).await.unwrap().unwrap();
        assert_eq!(value, serde_json::json!(3));

        let err = settled(Err(BridgeError::Disconnected)).await.unwrap();
        assert_eq!(err, Err(BridgeError::Disconnected));
    }

    #[test]
    fn test_target_accessors() {
        let handle = NativeHandle {
            service: "Media".to_string(),
            id: Uuid::new_v4(),
        };
        assert_eq!(Target::Handle(&handle).service(), "Media");
        assert_eq!(Target::Handle(&handle).handle_id(), Some(handle.id));
        assert_eq!(Target::Service("Rover").handle_id(), None);
    }
}
