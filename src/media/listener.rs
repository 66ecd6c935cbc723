//! Listener registration and the per-handle event multiplexer.
//!
//! Every event pushed for a handle goes through one [`Listener`]: it keeps
//! the cached status/duration/position up to date and fans the event out to
//! whichever callbacks were registered at creation.

use std::sync::Mutex;

use crate::bridge::{MediaError, MediaStatus, NativeEvent};

type StatusCallback = Box<dyn Fn(MediaStatus) + Send + Sync>;
type SuccessCallback = Box<dyn Fn() + Send + Sync>;
type ErrorCallback = Box<dyn Fn(MediaError) + Send + Sync>;

/// Optional callbacks wired to a media handle when it is created.
#[derive(Default)]
pub struct MediaCallbacks {
    on_status_update: Option<StatusCallback>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl MediaCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called whenever the resource changes state.
    pub fn on_status_update(mut self, f: impl Fn(MediaStatus) + Send + Sync + 'static) -> Self {
        self.on_status_update = Some(Box::new(f));
        self
    }

    /// Called after the current play, record, or stop action completes.
    pub fn on_success(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Called when the native side or the bridge reports a fault.
    pub fn on_error(mut self, f: impl Fn(MediaError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl std::fmt::Debug for MediaCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaCallbacks")
            .field("on_status_update", &self.on_status_update.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Snapshot {
    pub status: MediaStatus,
    pub duration: Option<f64>,
    pub position: f64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            status: MediaStatus::None,
            duration: None,
            position: 0.0,
        }
    }
}

pub(crate) struct Listener {
    callbacks: MediaCallbacks,
    snapshot: Mutex<Snapshot>,
}

impl Listener {
    pub fn new(callbacks: MediaCallbacks) -> Self {
        Self {
            callbacks,
            snapshot: Mutex::new(Snapshot::default()),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.lock().map(|s| *s).unwrap_or_default()
    }

    pub fn set_position(&self, seconds: f64) {
        if let Ok(mut snapshot) = self.snapshot.lock() {
            snapshot.position = seconds;
        }
    }

    /// Handle one pushed event. The snapshot lock is released before any
    /// callback runs, so callbacks may query the handle.
    pub fn dispatch(&self, event: NativeEvent) {
        match event {
            NativeEvent::Status { code } => {
                if let Ok(mut snapshot) = self.snapshot.lock() {
                    snapshot.status = code;
                    if code == MediaStatus::Stopped {
                        snapshot.position = 0.0;
                    }
                }
                tracing::debug!("Media status -> {}", code);
                if let Some(cb) = &self.callbacks.on_status_update {
                    cb(code);
                }
            }
            NativeEvent::Duration { seconds } => {
                if let Ok(mut snapshot) = self.snapshot.lock() {
                    snapshot.duration = (seconds.is_finite() && seconds >= 0.0).then_some(seconds);
                }
            }
            NativeEvent::Position { seconds } => {
                if seconds.is_finite() {
                    self.set_position(seconds);
                }
            }
            NativeEvent::Error { error } => self.report_error(error),
            NativeEvent::Completed => {
                if let Some(cb) = &self.callbacks.on_success {
                    cb();
                }
            }
        }
    }

    pub fn report_error(&self, error: MediaError) {
        tracing::warn!("Media error: {}", error);
        if let Some(cb) = &self.callbacks.on_error {
            cb(error);
        }
    }
}
