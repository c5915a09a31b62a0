use std::time::Duration;

use anyhow::Result;
use ble_buddy_lib::config::AppConfig;
use ble_buddy_lib::core::bluetooth::DisplayState;
use ble_buddy_lib::core::{UiEvent, UiSink};
use ble_buddy_lib::state::AppState;
use ble_buddy_lib::{commands, logging};
use log::{info, warn};
use tokio::sync::mpsc;

/// Seconds between device list reprints while something changed
const LIST_REFRESH_SECS: u64 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, load_error) = match AppConfig::load_config().await {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    if let Err(e) = logging::init(&config.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    if let Some(e) = load_error {
        warn!("Failed to load config, using defaults: {:#}", e);
    }

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let state = AppState::new(config, UiSink::new(ui_tx)).await?;
    if let Err(e) = state.coordinator.lock().await.start() {
        warn!("Discovery not started: {}", e);
    }
    info!("Discovering peripherals, press Ctrl-C to quit");

    let mut ticker = tokio::time::interval(Duration::from_secs(LIST_REFRESH_SECS));
    let mut dirty = false;
    loop {
        tokio::select! {
            event = ui_rx.recv() => match event {
                Some(UiEvent::Refresh) => dirty = true,
                Some(UiEvent::Notice(notice)) => println!("!! {}: {}", notice.title, notice.detail),
                Some(UiEvent::TextReceived { id, text }) => println!("<< {}: {}", id, text),
                None => break,
            },
            _ = ticker.tick() => {
                if dirty {
                    dirty = false;
                    print_devices(&commands::device_list(&state).await);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    state.shutdown().await;
    Ok(())
}

fn print_devices(devices: &[DisplayState]) {
    println!("---- {} device(s) ----", devices.len());
    for device in devices {
        let status = if device.disabled {
            "Disabled"
        } else {
            device.connection.label()
        };
        println!(
            "{:<24} {:>9} {}{} [{}]",
            device.name,
            device.rssi_label(),
            "|".repeat(device.signal_bars as usize),
            " ".repeat(4 - device.signal_bars.min(4) as usize),
            status
        );
        if device.traversal_complete {
            for line in &device.gatt_lines {
                println!("    {}", line);
            }
        }
    }
}
