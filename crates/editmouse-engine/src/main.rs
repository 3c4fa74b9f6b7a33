//! Edit Mouse engine entry point.
//!
//! Wires the platform adapters into the engine and runs until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config_from()       -- engine settings + seeded mappings
//!  └─ EngineState::new()       -- mapping store, registry, remap engine, capture
//!  └─ start services
//!       ├─ DeviceWatcher       (background thread, periodic rescan)
//!       ├─ EventTap session    (evdev grab thread on Linux)
//!       └─ device event pump   (Tokio task, keeps capture state current)
//! ```

use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use editmouse_engine::application::capture::{EventTap, TapError};
use editmouse_engine::application::device_registry::{DeviceEvent, DeviceInventory};
use editmouse_engine::application::remap_engine::EventSynthesizer;
use editmouse_engine::infrastructure::device_watch::start_device_watcher;
use editmouse_engine::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, ConfigError, EngineConfig,
    EngineSettings,
};
use editmouse_engine::infrastructure::ui_bridge::EngineState;

/// Command-line options for the engine binary.
#[derive(Debug, Parser)]
#[command(
    name = "editmouse-engine",
    about = "Per-device mouse button remapping engine",
    version
)]
struct Cli {
    /// Config file to use instead of the per-user default location.
    #[arg(long, env = "EDITMOUSE_CONFIG")]
    config: Option<PathBuf>,

    /// Do not start capture at launch, overriding `capture_on_start`.
    #[arg(long)]
    no_capture: bool,
}

type Adapters = (
    Arc<dyn DeviceInventory>,
    Arc<dyn EventTap>,
    Arc<dyn EventSynthesizer>,
);

#[cfg(target_os = "linux")]
fn platform_adapters(settings: &EngineSettings) -> Adapters {
    use editmouse_engine::infrastructure::event_tap::linux::EvdevEventTap;
    use editmouse_engine::infrastructure::inventory::linux::EvdevInventory;
    use editmouse_engine::infrastructure::synthesizer::linux::UinputSynthesizer;
    use editmouse_engine::infrastructure::synthesizer::UnavailableSynthesizer;

    let prefix = settings.virtual_device_name.clone();
    let synthesizer: Arc<dyn EventSynthesizer> = match UinputSynthesizer::new(prefix.clone()) {
        Ok(synth) => Arc::new(synth),
        Err(e) => {
            warn!("{e}; remapped buttons will pass through unchanged");
            Arc::new(UnavailableSynthesizer::new(e.to_string()))
        }
    };
    (
        Arc::new(EvdevInventory::new(prefix.clone())),
        Arc::new(EvdevEventTap::new(prefix, settings.rescan_interval())),
        synthesizer,
    )
}

#[cfg(not(target_os = "linux"))]
fn platform_adapters(_settings: &EngineSettings) -> Adapters {
    use editmouse_engine::infrastructure::event_tap::UnsupportedEventTap;
    use editmouse_engine::infrastructure::inventory::UnsupportedInventory;
    use editmouse_engine::infrastructure::synthesizer::UnavailableSynthesizer;

    warn!("no input backend for {}; running without capture", std::env::consts::OS);
    (
        Arc::new(UnsupportedInventory),
        Arc::new(UnsupportedEventTap),
        Arc::new(UnavailableSynthesizer::new(format!(
            "no synthesizer backend for {}",
            std::env::consts::OS
        ))),
    )
}

fn resolve_config_path(cli: &Cli) -> Result<PathBuf, ConfigError> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => config_file_path(),
    }
}

/// Writes the default config on first run so the user has a file to edit.
fn write_default_config_if_missing(path: &Path) {
    if path.exists() {
        return;
    }
    match save_config_to(path, &EngineConfig::default()) {
        Ok(()) => info!("wrote default config to {}", path.display()),
        Err(e) => debug!("could not write default config: {e}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(&cli);
    let loaded = config_path
        .as_ref()
        .map_err(|e| e.to_string())
        .and_then(|path| load_config_from(path).map_err(|e| e.to_string()));
    let default_level = loaded
        .as_ref()
        .map(|cfg| cfg.engine.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&default_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Edit Mouse engine starting");

    let config = match loaded {
        Ok(config) => {
            if let Ok(path) = &config_path {
                write_default_config_if_missing(path);
            }
            config
        }
        Err(e) => {
            error!("{e}; continuing with default settings and no mappings");
            EngineConfig::default()
        }
    };

    let (inventory, tap, synthesizer) = platform_adapters(&config.engine);
    let state = EngineState::new(inventory, tap, synthesizer, &config);

    // Shutdown flag shared across all background services.
    let running = Arc::new(AtomicBool::new(true));

    // ── Initial scan + hot-plug watcher ───────────────────────────────────────
    if let Err(e) = state.registry.rescan() {
        warn!("initial device scan failed: {e}");
    }
    let watcher = match start_device_watcher(
        Arc::clone(&state.registry),
        config.engine.rescan_interval(),
        Arc::clone(&running),
    ) {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("failed to start device watcher: {e}");
            None
        }
    };

    // ── Device event pump ─────────────────────────────────────────────────────
    let mut device_events = state.subscribe_devices();
    let pump_state = Arc::clone(&state);
    tokio::spawn(async move {
        loop {
            match device_events.recv().await {
                Ok(DeviceEvent::Connected(device)) => {
                    debug!(device = %device.id, "pump: connected");
                }
                Ok(DeviceEvent::Disconnected(id)) => {
                    debug!(device = %id, "pump: disconnected");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "device event pump lagged");
                }
                Err(RecvError::Closed) => break,
            }
            pump_state.capture.refresh_state();
        }
    });

    // ── Capture ───────────────────────────────────────────────────────────────
    if config.engine.capture_on_start && !cli.no_capture {
        match state.capture.start() {
            Ok(capture_state) => info!(state = ?capture_state, "capture active"),
            Err(TapError::PermissionDenied(_)) => {
                warn!("input permission denied; buttons behave normally until it is granted");
            }
            Err(e) => error!("capture not started: {e}"),
        }
    } else {
        info!("capture disabled at launch; waiting for a start command");
    }

    // ── Ctrl-C / SIGTERM handler ──────────────────────────────────────────────
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!("Edit Mouse engine ready.  Press Ctrl-C to exit.");

    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    state.capture.stop();
    if let Some(handle) = watcher {
        if handle.join().is_err() {
            error!("device watcher panicked");
        }
    }

    info!("Edit Mouse engine stopped");
    Ok(())
}
