use std::sync::Arc;

use super::listener::{Listener, MediaCallbacks};
use super::locator;
use super::object::MediaObject;
use crate::bridge::{EventSink, NativeBridge};
use crate::config::BridgeConfig;

/// Factory for [`MediaObject`]s backed by the native media service.
pub struct MediaPlugin {
    bridge: Arc<dyn NativeBridge>,
    config: BridgeConfig,
}

impl MediaPlugin {
    pub fn new(bridge: Arc<dyn NativeBridge>, config: BridgeConfig) -> Self {
        Self { bridge, config }
    }

    pub fn is_available(&self) -> bool {
        self.bridge.is_available(&self.config.media_service)
    }

    /// Open a media resource at `locator` (a path or URI).
    ///
    /// Never fails: if the native service is missing or refuses the
    /// allocation, the returned object is unusable (see [`MediaObject`]).
    pub fn create(&self, locator: &str, callbacks: MediaCallbacks) -> MediaObject {
        let locator = locator::normalize(locator, self.config.strip_file_scheme);
        let service = &self.config.media_service;

        if !self.is_available() {
            tracing::warn!("Media plugin '{}' not available, {} will be inert", service, locator);
            return MediaObject::unavailable(locator);
        }

        let handle = match self.bridge.create(service, &locator) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Failed to create media handle for {}: {}", locator, e);
                return MediaObject::unavailable(locator);
            }
        };

        let listener = Arc::new(Listener::new(callbacks));
        let sink_listener = listener.clone();
        let sink: EventSink = Arc::new(move |event| sink_listener.dispatch(event));
        let subscription = self.bridge.on_event(&handle, sink);

        tracing::info!("Media {} created for {}", handle, locator);
        MediaObject::active(
            locator,
            handle,
            self.bridge.clone(),
            listener,
            subscription,
            self.config.deferred_timeout(),
        )
    }
}
