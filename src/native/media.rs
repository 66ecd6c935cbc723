//! In-process stand-in for the native media plugin.
//!
//! Keeps one player/recorder per handle and pushes the same status,
//! duration, position, and error events a device plugin would. Playback
//! position follows the wall clock while running. No audio is decoded or
//! captured.

use rand::Rng;
use serde_json::json;
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

use crate::bridge::exec::{EventQueue, NativePlugin, PluginCall, PluginResult};
use crate::bridge::{MediaError, MediaErrorCode, MediaStatus, NativeEvent};
use crate::media::locator::{self, LocatorKind};
use crate::media::{MediaCall, PlayOptions};

/// Container formats the simulated player accepts.
const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "wav", "ogg", "amr", "3gp", "mp4"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Playback,
    Recording,
}

#[derive(Debug)]
struct Player {
    src: String,
    mode: Mode,
    status: MediaStatus,
    /// Seconds accumulated before `running_since`.
    position: f64,
    running_since: Option<Instant>,
    duration: Option<f64>,
    volume: f32,
    loops_left: u32,
}

impl Player {
    fn new(src: String, duration: Option<f64>) -> Self {
        Self {
            src,
            mode: Mode::Idle,
            status: MediaStatus::None,
            position: 0.0,
            running_since: None,
            duration,
            volume: 1.0,
            loops_left: 0,
        }
    }

    fn current_position(&self) -> f64 {
        let elapsed = self
            .running_since
            .map(|since| since.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let position = self.position + elapsed;
        match (self.mode, self.duration) {
            (Mode::Playback, Some(duration)) => position.min(duration),
            _ => position,
        }
    }

    /// Fold the running time into `position` and stop the clock.
    fn freeze(&mut self) {
        self.position = self.current_position();
        self.running_since = None;
    }

    fn set_status(&mut self, id: Uuid, status: MediaStatus, events: &mut EventQueue) {
        if self.status != status {
            self.status = status;
            events.emit(id, NativeEvent::Status { code: status });
        }
    }
}

pub struct SimulatedMedia {
    service: String,
    players: HashMap<Uuid, Player>,
    catalog: HashMap<String, f64>,
    online: bool,
}

impl Default for SimulatedMedia {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedMedia {
    pub fn new() -> Self {
        Self {
            service: "Media".to_string(),
            players: HashMap::new(),
            catalog: HashMap::new(),
            online: true,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Register a locator with a known duration in seconds.
    pub fn with_track(mut self, locator: impl Into<String>, seconds: f64) -> Self {
        self.catalog.insert(locator.into(), seconds);
        self
    }

    /// Fail remote locators with a network error.
    pub fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    pub fn live_handles(&self) -> usize {
        self.players.len()
    }

    fn fail(id: Uuid, error: MediaError, events: &mut EventQueue) -> PluginResult {
        events.emit(id, NativeEvent::Error { error: error.clone() });
        PluginResult::error(error)
    }

    fn create(&mut self, id: Uuid, args: &serde_json::Value) -> PluginResult {
        let Some(src) = args.get("src").and_then(|v| v.as_str()) else {
            return PluginResult::error(MediaError::aborted("create requires src"));
        };
        let duration = self.catalog.get(src).copied();
        if self.players.insert(id, Player::new(src.to_string(), duration)).is_some() {
            tracing::warn!("Simulated media: handle {} recreated, previous instance dropped", id);
        }
        tracing::debug!("Simulated media: created {} for {}", id, src);
        PluginResult::NoResult
    }

    fn check_playable(&self, src: &str) -> Result<(), MediaError> {
        let supported = locator::extension(src)
            .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);
        if !supported {
            return Err(MediaError::new(
                MediaErrorCode::NoneSupported,
                format!("Unsupported media format: {}", src),
            ));
        }
        if locator::classify(src) == LocatorKind::Remote && !self.online {
            return Err(MediaError::new(
                MediaErrorCode::Network,
                format!("Network unavailable for {}", src),
            ));
        }
        Ok(())
    }

    fn play(&mut self, id: Uuid, options: PlayOptions, events: &mut EventQueue) -> PluginResult {
        let checked = match self.players.get(&id) {
            Some(player) if player.mode == Mode::Recording => {
                Err(MediaError::aborted("Cannot play while recording"))
            }
            Some(player) => self.check_playable(&player.src),
            None => return Self::fail(id, unknown_handle(id), events),
        };
        if let Err(error) = checked {
            return Self::fail(id, error, events);
        }

        let Some(player) = self.players.get_mut(&id) else {
            return Self::fail(id, unknown_handle(id), events);
        };
        match player.status {
            MediaStatus::Running => {}
            MediaStatus::Paused => {
                player.running_since = Some(Instant::now());
                player.set_status(id, MediaStatus::Running, events);
            }
            _ => {
                player.mode = Mode::Playback;
                player.loops_left = options.number_of_loops.unwrap_or(1).saturating_sub(1);
                player.set_status(id, MediaStatus::Starting, events);
                if let Some(duration) = player.duration {
                    events.emit(id, NativeEvent::Duration { seconds: duration });
                }
                player.running_since = Some(Instant::now());
                player.set_status(id, MediaStatus::Running, events);
            }
        }
        PluginResult::NoResult
    }

    /// Finish playback that has run past the end of a known duration.
    fn tick(&mut self, id: Uuid, events: &mut EventQueue) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        let Some(duration) = player.duration else {
            return;
        };
        if player.mode != Mode::Playback || player.status != MediaStatus::Running {
            return;
        }
        if player.current_position() < duration {
            return;
        }
        if player.loops_left > 0 {
            player.loops_left -= 1;
            player.position = 0.0;
            player.running_since = Some(Instant::now());
            return;
        }
        player.running_since = None;
        player.position = 0.0;
        player.mode = Mode::Idle;
        player.set_status(id, MediaStatus::Stopped, events);
        events.emit(id, NativeEvent::Completed);
    }

    fn handle_call(&mut self, id: Uuid, call: MediaCall, events: &mut EventQueue) -> PluginResult {
        if let MediaCall::Play(options) = call {
            return self.play(id, options, events);
        }
        if call == MediaCall::Release {
            // Nobody listens after release, so no events.
            if self.players.remove(&id).is_none() {
                tracing::debug!("Simulated media: release of unknown handle {}", id);
            }
            return PluginResult::NoResult;
        }

        let Some(player) = self.players.get_mut(&id) else {
            return Self::fail(id, unknown_handle(id), events);
        };

        match call {
            MediaCall::Pause => {
                if player.mode == Mode::Playback && player.status == MediaStatus::Running {
                    player.freeze();
                    player.set_status(id, MediaStatus::Paused, events);
                }
                PluginResult::NoResult
            }
            MediaCall::Stop => {
                if player.mode == Mode::Playback {
                    player.running_since = None;
                    player.position = 0.0;
                    player.mode = Mode::Idle;
                    player.set_status(id, MediaStatus::Stopped, events);
                    events.emit(id, NativeEvent::Completed);
                }
                PluginResult::NoResult
            }
            MediaCall::SeekTo(ms) => {
                let mut seconds = ms as f64 / 1000.0;
                if let Some(duration) = player.duration {
                    seconds = seconds.min(duration);
                }
                player.position = seconds;
                if player.running_since.is_some() {
                    player.running_since = Some(Instant::now());
                }
                events.emit(id, NativeEvent::Position { seconds });
                PluginResult::NoResult
            }
            MediaCall::SetVolume(volume) => {
                player.volume = volume.clamp(0.0, 1.0);
                PluginResult::NoResult
            }
            MediaCall::StartRecord => {
                if player.mode == Mode::Playback {
                    let error = MediaError::aborted("Cannot record while playing");
                    return Self::fail(id, error, events);
                }
                player.mode = Mode::Recording;
                player.position = 0.0;
                player.running_since = Some(Instant::now());
                player.set_status(id, MediaStatus::Running, events);
                PluginResult::NoResult
            }
            MediaCall::PauseRecord => {
                if player.mode == Mode::Recording && player.status == MediaStatus::Running {
                    player.freeze();
                    player.set_status(id, MediaStatus::Paused, events);
                }
                PluginResult::NoResult
            }
            MediaCall::ResumeRecord => {
                if player.mode == Mode::Recording && player.status == MediaStatus::Paused {
                    player.running_since = Some(Instant::now());
                    player.set_status(id, MediaStatus::Running, events);
                }
                PluginResult::NoResult
            }
            MediaCall::StopRecord => {
                if player.mode == Mode::Recording {
                    player.freeze();
                    let recorded = player.position;
                    player.duration = Some(recorded);
                    player.position = 0.0;
                    player.mode = Mode::Idle;
                    events.emit(id, NativeEvent::Duration { seconds: recorded });
                    player.set_status(id, MediaStatus::Stopped, events);
                    events.emit(id, NativeEvent::Completed);
                }
                PluginResult::NoResult
            }
            MediaCall::GetCurrentPosition => {
                let position = match player.mode {
                    Mode::Playback => player.current_position(),
                    _ => player.position,
                };
                PluginResult::Ok(json!(position))
            }
            MediaCall::GetCurrentAmplitude => {
                let amplitude = if player.mode == Mode::Recording && player.status == MediaStatus::Running {
                    // Scaled by volume so muted recorders read as silence.
                    rand::thread_rng().gen_range(0.0..1.0) * f64::from(player.volume)
                } else {
                    0.0
                };
                PluginResult::Ok(json!(amplitude))
            }
            MediaCall::Play(_) | MediaCall::Release => PluginResult::NoResult,
        }
    }
}

fn unknown_handle(id: Uuid) -> MediaError {
    MediaError::aborted(format!("No media instance for handle {}", id))
}

impl NativePlugin for SimulatedMedia {
    fn service(&self) -> &str {
        &self.service
    }

    fn execute(&mut self, call: PluginCall, events: &mut EventQueue) -> PluginResult {
        let Some(id) = call.handle else {
            return PluginResult::error(MediaError::aborted(format!(
                "{} requires a media handle",
                call.action
            )));
        };

        if call.action == "create" {
            return self.create(id, &call.args);
        }

        self.tick(id, events);

        match MediaCall::from_invocation(&call.action, &call.args) {
            Ok(media_call) => self.handle_call(id, media_call, events),
            Err(msg) => Self::fail(id, MediaError::aborted(msg), events),
        }
    }
}
