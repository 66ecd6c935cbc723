//! Simulated native plugins.
//!
//! These run inside a [`NativeHost`](crate::bridge::exec::NativeHost) and let
//! the bindings be exercised end to end without a device:
//! - `SimulatedMedia`: player/recorder state machine per handle
//! - `SimulatedRover`: tracking on/off flag

pub mod media;
pub mod rover;

pub use media::SimulatedMedia;
pub use rover::SimulatedRover;

use crate::bridge::exec::{HostConnection, NativeHost};

/// Spawn a host running the simulated media and tracking plugins.
pub fn spawn_simulated_host(media: SimulatedMedia, rover: SimulatedRover) -> HostConnection {
    NativeHost::new().with_plugin(media).with_plugin(rover).spawn()
}
