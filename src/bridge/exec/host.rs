//! Native side of the exec bridge.
//!
//! A [`NativeHost`] owns a registry of [`NativePlugin`]s keyed by service name
//! and processes request frames one at a time, in arrival order. Events a
//! plugin queues while handling a call are flushed before the call's result,
//! so state pushes are visible by the time a deferred call settles.

use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::protocol::{self, ExecRequest, HostMessage, ResultStatus};
use crate::bridge::{MediaError, NativeEvent};

/// One call as seen by a plugin.
#[derive(Debug, Clone)]
pub struct PluginCall {
    pub action: String,
    pub handle: Option<Uuid>,
    pub args: serde_json::Value,
}

/// Outcome of a plugin call.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginResult {
    Ok(serde_json::Value),
    Error(serde_json::Value),
    /// Nothing to report. Deferred callers receive `null`.
    NoResult,
}

impl PluginResult {
    pub fn error(err: MediaError) -> Self {
        match serde_json::to_value(&err) {
            Ok(payload) => Self::Error(payload),
            Err(_) => Self::Error(serde_json::Value::String(err.message)),
        }
    }
}

/// Events queued by a plugin while it handles a call.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<(Uuid, NativeEvent)>,
}

impl EventQueue {
    pub fn emit(&mut self, handle: Uuid, event: NativeEvent) {
        self.events.push((handle, event));
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn drain(&mut self) -> impl Iterator<Item = (Uuid, NativeEvent)> + '_ {
        self.events.drain(..)
    }
}

/// Trait for native plugins reachable through the host
pub trait NativePlugin: Send {
    /// Service name callers address this plugin by
    fn service(&self) -> &str;

    /// Handle one call, queueing any events it produces
    fn execute(&mut self, call: PluginCall, events: &mut EventQueue) -> PluginResult;
}

/// Both ends of a running host, as handed to the application side.
pub struct HostConnection {
    pub services: Vec<String>,
    pub to_host: mpsc::UnboundedSender<String>,
    pub from_host: mpsc::UnboundedReceiver<String>,
    pub task: JoinHandle<()>,
}

#[derive(Default)]
pub struct NativeHost {
    plugins: HashMap<String, Box<dyn NativePlugin>>,
}

impl NativeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plugin(mut self, plugin: impl NativePlugin + 'static) -> Self {
        self.register(Box::new(plugin));
        self
    }

    pub fn register(&mut self, plugin: Box<dyn NativePlugin>) {
        let service = plugin.service().to_string();
        if self.plugins.insert(service.clone(), plugin).is_some() {
            tracing::warn!("Native host: replaced plugin for service {}", service);
        }
    }

    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.plugins.keys().cloned().collect();
        services.sort();
        services
    }

    /// Process one request frame and return the frames to send back.
    pub fn handle_frame(&mut self, frame: &str) -> Vec<String> {
        let request = match protocol::decode_request(frame) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!("Native host: dropping undecodable request: {}", e);
                return Vec::new();
            }
        };

        let messages = self.dispatch(request);
        messages
            .iter()
            .filter_map(|msg| match protocol::encode(msg) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    tracing::error!("Native host: failed to encode reply: {}", e);
                    None
                }
            })
            .collect()
    }

    fn dispatch(&mut self, request: ExecRequest) -> Vec<HostMessage> {
        let ExecRequest {
            callback_id,
            service,
            handle,
            action,
            args,
        } = request;

        let mut events = EventQueue::default();
        let result = match self.plugins.get_mut(&service) {
            Some(plugin) => {
                tracing::debug!("Native host: {}.{} handle={:?}", service, action, handle);
                plugin.execute(
                    PluginCall {
                        action,
                        handle,
                        args,
                    },
                    &mut events,
                )
            }
            None => {
                tracing::warn!("Native host: no plugin for service {}", service);
                let err = MediaError::aborted(format!("Service not found: {}", service));
                if callback_id.is_none() {
                    if let Some(id) = handle {
                        events.emit(id, NativeEvent::Error { error: err.clone() });
                    }
                }
                PluginResult::error(err)
            }
        };

        let mut messages: Vec<HostMessage> = events
            .drain()
            .map(|(handle, event)| HostMessage::Event { handle, event })
            .collect();

        if let Some(callback_id) = callback_id {
            let (status, payload) = match result {
                PluginResult::Ok(value) => (ResultStatus::Ok, value),
                PluginResult::NoResult => (ResultStatus::Ok, serde_json::Value::Null),
                PluginResult::Error(value) => (ResultStatus::Error, value),
            };
            messages.push(HostMessage::Result {
                callback_id,
                status,
                payload,
            });
        }

        messages
    }

    /// Run the host on its own task.
    pub fn spawn(mut self) -> HostConnection {
        let services = self.services();
        let (to_host, mut requests) = mpsc::unbounded_channel::<String>();
        let (replies, from_host) = mpsc::unbounded_channel::<String>();

        let task = tokio::spawn(async move {
            tracing::info!("Native host: serving {:?}", self.services());

            while let Some(frame) = requests.recv().await {
                for reply in self.handle_frame(&frame) {
                    if replies.send(reply).is_err() {
                        tracing::info!("Native host: client gone, shutting down");
                        return;
                    }
                }
            }

            tracing::info!("Native host: request channel closed");
        });

        HostConnection {
            services,
            to_host,
            from_host,
            task,
        }
    }
}
