pub mod bridge;
pub mod config;
pub mod error;
pub mod media;
pub mod native;
pub mod tracking;

use once_cell::sync::OnceCell;

pub use bridge::exec::{ExecBridge, NativeHost};
pub use bridge::{
    BridgeError, MediaError, MediaErrorCode, MediaStatus, NativeBridge, NativeEvent, NativeHandle,
};
pub use config::BridgeConfig;
pub use error::ProxyError;
pub use media::{HandleState, MediaCallbacks, MediaObject, MediaPlugin, PlayOptions};
pub use tracking::Rover;

static TRACING: OnceCell<()> = OnceCell::new();

/// Install the fmt subscriber once; later calls (and embedders that already
/// installed one) are left alone.
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        if tracing_subscriber::fmt().try_init().is_err() {
            tracing::debug!("Global tracing subscriber already set");
        }
    });
}
