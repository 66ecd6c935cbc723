//! `MediaObject`: a typed proxy over one native media handle.
//!
//! Calls are forwarded through the injected [`NativeBridge`]:
//! - sync-style calls (`play`, `pause`, ...) return nothing; delivery failures
//!   go to the `on_error` callback, never to the caller
//! - deferred calls (`get_current_position`, `get_current_amplitude`) settle
//!   exactly once with a value or a [`ProxyError`]
//!
//! A handle that could not be created (service missing, allocation failed)
//! or that has been released forwards nothing: sync-style calls are no-ops,
//! deferred calls reject with `Unavailable` / `Released`, and `get_duration`
//! reports `-1`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::call::{MediaCall, PlayOptions};
use super::listener::Listener;
use crate::bridge::{MediaError, MediaStatus, NativeBridge, NativeHandle, Subscription, Target};
use crate::error::ProxyError;

/// Duration reported while the native side has not announced one.
pub const DURATION_UNKNOWN: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Active,
    /// The native plugin was missing or refused the allocation.
    Unavailable,
    Released,
}

struct Instance {
    handle: NativeHandle,
    bridge: Arc<dyn NativeBridge>,
    listener: Arc<Listener>,
    subscription: Mutex<Option<Subscription>>,
    released: AtomicBool,
}

pub struct MediaObject {
    locator: String,
    instance: Option<Instance>,
    timeout: Option<Duration>,
}

impl MediaObject {
    pub(crate) fn active(
        locator: String,
        handle: NativeHandle,
        bridge: Arc<dyn NativeBridge>,
        listener: Arc<Listener>,
        subscription: Subscription,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            locator,
            instance: Some(Instance {
                handle,
                bridge,
                listener,
                subscription: Mutex::new(Some(subscription)),
                released: AtomicBool::new(false),
            }),
            timeout,
        }
    }

    pub(crate) fn unavailable(locator: String) -> Self {
        Self {
            locator,
            instance: None,
            timeout: None,
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn state(&self) -> HandleState {
        match &self.instance {
            None => HandleState::Unavailable,
            Some(inst) if inst.released.load(Ordering::SeqCst) => HandleState::Released,
            Some(_) => HandleState::Active,
        }
    }

    pub fn handle(&self) -> Option<&NativeHandle> {
        self.instance.as_ref().map(|inst| &inst.handle)
    }

    /// Last status pushed by the native side.
    pub fn status(&self) -> MediaStatus {
        self.instance
            .as_ref()
            .map(|inst| inst.listener.snapshot().status)
            .unwrap_or(MediaStatus::None)
    }

    /// Last known position in seconds.
    pub fn position(&self) -> f64 {
        self.instance
            .as_ref()
            .map(|inst| inst.listener.snapshot().position)
            .unwrap_or(0.0)
    }

    fn live(&self) -> Result<&Instance, ProxyError> {
        let inst = self.instance.as_ref().ok_or(ProxyError::Unavailable)?;
        if inst.released.load(Ordering::SeqCst) {
            return Err(ProxyError::Released);
        }
        Ok(inst)
    }

    fn forward(&self, call: MediaCall) {
        let inst = match self.live() {
            Ok(inst) => inst,
            Err(reason) => {
                tracing::debug!("Media {}: ignoring {} ({})", self.locator, call.action(), reason);
                return;
            }
        };

        tracing::debug!("Media {}: {}", inst.handle, call.action());
        let action = call.action();
        if let Err(e) = inst.bridge.invoke_sync(Target::Handle(&inst.handle), call.into()) {
            inst.listener
                .report_error(MediaError::aborted(format!("{} not delivered: {}", action, e)));
        }
    }

    async fn deferred(&self, call: MediaCall) -> Result<serde_json::Value, ProxyError> {
        let inst = self.live()?;
        let pending = inst.bridge.invoke_async(Target::Handle(&inst.handle), call.into());

        let settled = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| ProxyError::Timeout)?,
            None => pending.await,
        };

        match settled {
            Ok(result) => result.map_err(ProxyError::from),
            // Sender dropped without settling
            Err(_) => Err(ProxyError::Bridge(crate::bridge::BridgeError::Disconnected)),
        }
    }

    /// Current amplitude of the recording, 0.0 to 1.0.
    pub async fn get_current_amplitude(&self) -> Result<f64, ProxyError> {
        let value = self.deferred(MediaCall::GetCurrentAmplitude).await?;
        value
            .as_f64()
            .ok_or_else(|| ProxyError::Decode(format!("amplitude {}", value)))
    }

    /// Current position within the file, in seconds. Also refreshes [`Self::position`].
    pub async fn get_current_position(&self) -> Result<f64, ProxyError> {
        let value = self.deferred(MediaCall::GetCurrentPosition).await?;
        let seconds = value
            .as_f64()
            .ok_or_else(|| ProxyError::Decode(format!("position {}", value)))?;
        if let Ok(inst) = self.live() {
            inst.listener.set_position(seconds);
        }
        Ok(seconds)
    }

    /// Duration in seconds, or `-1` while unknown.
    pub fn get_duration(&self) -> f64 {
        match self.live() {
            Ok(inst) => inst.listener.snapshot().duration.unwrap_or(DURATION_UNKNOWN),
            Err(_) => DURATION_UNKNOWN,
        }
    }

    /// Start or resume playback.
    pub fn play(&self, options: PlayOptions) {
        self.forward(MediaCall::Play(options));
    }

    pub fn pause(&self) {
        self.forward(MediaCall::Pause);
    }

    pub fn stop(&self) {
        self.forward(MediaCall::Stop);
    }

    pub fn seek_to(&self, milliseconds: u64) {
        self.forward(MediaCall::SeekTo(milliseconds));
    }

    /// Set playback volume. Values are clamped to 0.0..=1.0; NaN is ignored.
    pub fn set_volume(&self, volume: f32) {
        if volume.is_nan() {
            tracing::warn!("Media {}: ignoring NaN volume", self.locator);
            return;
        }
        self.forward(MediaCall::SetVolume(volume.clamp(0.0, 1.0)));
    }

    pub fn start_record(&self) {
        self.forward(MediaCall::StartRecord);
    }

    pub fn stop_record(&self) {
        self.forward(MediaCall::StopRecord);
    }

    pub fn pause_record(&self) {
        self.forward(MediaCall::PauseRecord);
    }

    pub fn resume_record(&self) {
        self.forward(MediaCall::ResumeRecord);
    }

    /// Free the native resource and detach the listeners.
    ///
    /// Only the first call does anything; later calls, and calls on an
    /// unavailable handle, are no-ops.
    pub fn release(&self) {
        let Some(inst) = &self.instance else {
            tracing::debug!("Media {}: release on unavailable handle", self.locator);
            return;
        };
        if inst.released.swap(true, Ordering::SeqCst) {
            tracing::debug!("Media {}: already released", inst.handle);
            return;
        }

        if let Err(e) = inst
            .bridge
            .invoke_sync(Target::Handle(&inst.handle), MediaCall::Release.into())
        {
            tracing::warn!("Media {}: release not delivered: {}", inst.handle, e);
        }

        let subscription = inst.subscription.lock().ok().and_then(|mut s| s.take());
        if let Some(subscription) = subscription {
            subscription.cancel();
        }

        tracing::info!("Media {}: released", inst.handle);
    }
}

impl Drop for MediaObject {
    fn drop(&mut self) {
        if self.state() == HandleState::Active {
            self.release();
        }
    }
}

impl std::fmt::Debug for MediaObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaObject")
            .field("locator", &self.locator)
            .field("handle", &self.handle())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{
        settled, BridgeError, Deferred, EventSink, Invocation, MediaErrorCode, NativeEvent,
    };
    use crate::media::MediaCallbacks;
    use serde_json::json;
    use uuid::Uuid;

    /// Bridge that records what it is asked to forward.
    #[derive(Default)]
    struct RecordingBridge {
        sync_calls: Mutex<Vec<String>>,
        async_calls: Mutex<Vec<String>>,
        unsubscribed: AtomicBool,
        fail_sync: bool,
        reply: Option<Result<serde_json::Value, BridgeError>>,
    }

    impl NativeBridge for RecordingBridge {
        fn is_available(&self, _service: &str) -> bool {
            true
        }

        fn create(&self, service: &str, _locator: &str) -> Result<NativeHandle, BridgeError> {
            Ok(NativeHandle {
                service: service.to_string(),
                id: Uuid::new_v4(),
            })
        }

        fn invoke_sync(&self, _target: Target<'_>, call: Invocation) -> Result<(), BridgeError> {
            self.sync_calls.lock().unwrap().push(call.action);
            if self.fail_sync {
                Err(BridgeError::Disconnected)
            } else {
                Ok(())
            }
        }

        fn invoke_async(&self, _target: Target<'_>, call: Invocation) -> Deferred {
            self.async_calls.lock().unwrap().push(call.action);
            match &self.reply {
                Some(reply) => settled(reply.clone()),
                None => {
                    // Drop the sender without settling.
                    let (_tx, rx) = tokio::sync::oneshot::channel();
                    rx
                }
            }
        }

        fn on_event(&self, _handle: &NativeHandle, _sink: EventSink) -> Subscription {
            Subscription::detached()
        }
    }

    fn object_over(bridge: Arc<RecordingBridge>, callbacks: MediaCallbacks) -> (MediaObject, Arc<Listener>) {
        let listener = Arc::new(Listener::new(callbacks));
        let handle = bridge.create("Media", "a.mp3").unwrap();
        let flag = bridge.clone();
        let subscription = Subscription::new(move || flag.unsubscribed.store(true, Ordering::SeqCst));
        let object = MediaObject::active(
            "a.mp3".to_string(),
            handle,
            bridge,
            listener.clone(),
            subscription,
            None,
        );
        (object, listener)
    }

    #[test]
    fn test_sync_calls_are_forwarded_in_order() {
        let bridge = Arc::new(RecordingBridge::default());
        let (object, _) = object_over(bridge.clone(), MediaCallbacks::new());

        object.play(PlayOptions::default());
        object.seek_to(500);
        object.set_volume(0.4);
        object.pause();
        object.stop();

        assert_eq!(
            *bridge.sync_calls.lock().unwrap(),
            vec!["play", "seekTo", "setVolume", "pause", "stop"]
        );
    }

    #[test]
    fn test_release_is_idempotent_and_unsubscribes() {
        let bridge = Arc::new(RecordingBridge::default());
        let (object, _) = object_over(bridge.clone(), MediaCallbacks::new());

        object.release();
        object.release();

        assert_eq!(object.state(), HandleState::Released);
        assert!(bridge.unsubscribed.load(Ordering::SeqCst));
        assert_eq!(*bridge.sync_calls.lock().unwrap(), vec!["release"]);
    }

    #[tokio::test]
    async fn test_released_handle_forwards_nothing() {
        let bridge = Arc::new(RecordingBridge {
            reply: Some(Ok(json!(1.0))),
            ..Default::default()
        });
        let (object, _) = object_over(bridge.clone(), MediaCallbacks::new());
        object.release();

        object.play(PlayOptions::default());
        object.start_record();
        assert_eq!(object.get_current_position().await, Err(ProxyError::Released));
        assert_eq!(object.get_current_amplitude().await, Err(ProxyError::Released));
        assert_eq!(object.get_duration(), DURATION_UNKNOWN);

        assert_eq!(*bridge.sync_calls.lock().unwrap(), vec!["release"]);
        assert!(bridge.async_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_handle() {
        let object = MediaObject::unavailable("a.mp3".to_string());
        object.play(PlayOptions::default());
        object.pause();
        object.release();
        object.release();
        assert_eq!(object.state(), HandleState::Unavailable);
        assert_eq!(object.get_current_position().await, Err(ProxyError::Unavailable));
        assert_eq!(object.get_duration(), DURATION_UNKNOWN);
        assert_eq!(object.status(), MediaStatus::None);
    }

    #[test]
    fn test_delivery_failure_goes_to_error_listener() {
        let bridge = Arc::new(RecordingBridge {
            fail_sync: true,
            ..Default::default()
        });
        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        let (object, _) = object_over(
            bridge,
            MediaCallbacks::new().on_error(move |err| e.lock().unwrap().push(err)),
        );

        object.pause();

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, MediaErrorCode::Aborted);
        assert!(errors[0].message.contains("pause"));
    }

    #[test]
    fn test_volume_is_clamped_and_nan_ignored() {
        let bridge = Arc::new(RecordingBridge::default());
        let (object, _) = object_over(bridge.clone(), MediaCallbacks::new());
        object.set_volume(f32::NAN);
        object.set_volume(3.0);
        assert_eq!(*bridge.sync_calls.lock().unwrap(), vec!["setVolume"]);
    }

    #[tokio::test]
    async fn test_deferred_rejection_is_native_error() {
        let bridge = Arc::new(RecordingBridge {
            reply: Some(Err(BridgeError::Rejected(json!({"message": "no file", "code": 1})))),
            ..Default::default()
        });
        let (object, _) = object_over(bridge, MediaCallbacks::new());
        match object.get_current_position().await {
            Err(ProxyError::Native(err)) => assert_eq!(err.code, MediaErrorCode::Aborted),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_deferred_settles_as_disconnected() {
        let bridge = Arc::new(RecordingBridge::default());
        let (object, _) = object_over(bridge, MediaCallbacks::new());
        assert_eq!(
            object.get_current_amplitude().await,
            Err(ProxyError::Bridge(BridgeError::Disconnected))
        );
    }

    #[tokio::test]
    async fn test_non_numeric_result_is_decode_error() {
        let bridge = Arc::new(RecordingBridge {
            reply: Some(Ok(json!("loud"))),
            ..Default::default()
        });
        let (object, _) = object_over(bridge, MediaCallbacks::new());
        assert!(matches!(
            object.get_current_amplitude().await,
            Err(ProxyError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_position_refreshes_cache() {
        let bridge = Arc::new(RecordingBridge {
            reply: Some(Ok(json!(10.0))),
            ..Default::default()
        });
        let (object, _) = object_over(bridge, MediaCallbacks::new());
        assert_eq!(object.get_current_position().await, Ok(10.0));
        assert_eq!(object.position(), 10.0);
    }

    #[test]
    fn test_duration_follows_events() {
        let bridge = Arc::new(RecordingBridge::default());
        let (object, listener) = object_over(bridge, MediaCallbacks::new());
        assert_eq!(object.get_duration(), DURATION_UNKNOWN);
        listener.dispatch(NativeEvent::Duration { seconds: 180.0 });
        assert_eq!(object.get_duration(), 180.0);
    }

    #[test]
    fn test_drop_releases_active_handle() {
        let bridge = Arc::new(RecordingBridge::default());
        let (object, _) = object_over(bridge.clone(), MediaCallbacks::new());
        drop(object);
        assert_eq!(*bridge.sync_calls.lock().unwrap(), vec!["release"]);
        assert!(bridge.unsubscribed.load(Ordering::SeqCst));
    }
}
