//! Media binding: audio playback and recording through a native plugin.
//!
//! ```ignore
//! let media = MediaPlugin::new(bridge, BridgeConfig::default());
//! let file = media.create(
//!     "path/to/file.mp3",
//!     MediaCallbacks::new().on_status_update(|s| tracing::info!("status {}", s)),
//! );
//! file.play(PlayOptions::default());
//! let position = file.get_current_position().await?;
//! file.release();
//! ```

pub mod call;
pub mod listener;
pub mod locator;
pub mod object;
pub mod plugin;

pub use call::{MediaCall, PlayOptions};
pub use listener::MediaCallbacks;
pub use object::{HandleState, MediaObject, DURATION_UNKNOWN};
pub use plugin::MediaPlugin;

// Status codes
pub const MEDIA_NONE: u8 = 0;
pub const MEDIA_STARTING: u8 = 1;
pub const MEDIA_RUNNING: u8 = 2;
pub const MEDIA_PAUSED: u8 = 3;
pub const MEDIA_STOPPED: u8 = 4;

// Error codes
pub const MEDIA_ERR_ABORTED: u8 = 1;
pub const MEDIA_ERR_NETWORK: u8 = 2;
pub const MEDIA_ERR_DECODE: u8 = 3;
pub const MEDIA_ERR_NONE_SUPPORTED: u8 = 4;
