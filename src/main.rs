//! media-shell: drives the media and tracking bindings against the simulated
//! native host and logs everything that crosses the bridge.
//!
//! Usage: `media-shell [locator]` (default `a.mp3`). Configuration comes from
//! `MEDIA_BRIDGE_CONFIG` / `MEDIA_BRIDGE_*` environment variables.

use std::sync::Arc;

use futures_util::future::join_all;
use media_bridge::native::{spawn_simulated_host, SimulatedMedia, SimulatedRover};
use media_bridge::{
    init_tracing, BridgeConfig, ExecBridge, MediaCallbacks, MediaObject, MediaPlugin,
    NativeBridge, PlayOptions, ProxyError, Rover,
};
use tokio::time::{sleep, Duration};

const DEFAULT_LOCATOR: &str = "a.mp3";

fn logging_callbacks(label: &'static str) -> MediaCallbacks {
    MediaCallbacks::new()
        .on_status_update(move |status| tracing::info!("[{}] status: {} ({})", label, status, status.code()))
        .on_success(move || tracing::info!("[{}] action completed", label))
        .on_error(move |err| tracing::error!("[{}] error: {}", label, err))
}

async fn playback(media: &MediaPlugin, locator: &str) -> Result<(), ProxyError> {
    let file: MediaObject = media.create(locator, logging_callbacks("playback"));

    file.play(PlayOptions::default());
    sleep(Duration::from_millis(200)).await;
    tracing::info!("Duration: {}", file.get_duration());

    file.seek_to(10_000);
    tracing::info!("Position after seek: {:.2}s", file.get_current_position().await?);

    // Several queries in flight at once; each settles on its own.
    let positions = join_all((0..3).map(|_| file.get_current_position())).await;
    for position in positions {
        tracing::info!("Concurrent position: {:.2}s", position?);
    }

    file.set_volume(0.5);
    file.pause();
    file.stop();
    file.release();
    file.release();
    Ok(())
}

async fn recording(media: &MediaPlugin) -> Result<(), ProxyError> {
    let name = format!("recording-{}.m4a", chrono::Local::now().format("%Y%m%d-%H%M%S"));
    let path = std::env::temp_dir().join(name);
    let file = media.create(&path.to_string_lossy(), logging_callbacks("recording"));

    file.start_record();
    for _ in 0..3 {
        sleep(Duration::from_millis(100)).await;
        tracing::info!("Amplitude: {:.3}", file.get_current_amplitude().await?);
    }
    file.pause_record();
    file.resume_record();
    file.stop_record();
    sleep(Duration::from_millis(50)).await;
    tracing::info!("Recorded {:.2}s to {}", file.get_duration(), file.locator());
    file.release();
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match BridgeConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };

    let locator = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_LOCATOR.to_string());

    let host = spawn_simulated_host(
        SimulatedMedia::new()
            .with_service(config.media_service.clone())
            .with_track(locator.clone(), 180.0),
        SimulatedRover::new().with_service(config.tracking_service.clone()),
    );
    let bridge: Arc<dyn NativeBridge> = Arc::new(ExecBridge::connect(host));

    let media = MediaPlugin::new(bridge.clone(), config.clone());
    let rover = Rover::new(bridge, &config);

    if let Err(e) = playback(&media, &locator).await {
        tracing::error!("Playback scenario failed: {}", e);
    }
    if let Err(e) = recording(&media).await {
        tracing::error!("Recording scenario failed: {}", e);
    }

    match rover.start_tracking().await {
        Ok(()) => {
            tracing::info!("Tracking: {:?}", rover.is_tracking().await);
            if let Err(e) = rover.stop_tracking().await {
                tracing::error!("Failed to stop tracking: {}", e);
            }
        }
        Err(e) => tracing::error!("Failed to start tracking: {}", e),
    }

    // Let trailing status pushes reach the log before exit.
    sleep(Duration::from_millis(50)).await;
}
