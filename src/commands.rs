//! Presentation commands
//! The operations a device list or detail view may invoke. Each one takes the
//! coordinator lock, so it is serialised with radio events.

use std::path::Path;
use std::sync::Arc;

use log::info;
use uuid::Uuid;

use crate::core::bluetooth::{DeviceId, DisplayState};
use crate::core::DetailsObserver;
use crate::state::AppState;

/// Snapshot of every device seen since the last reset, in discovery order
pub async fn device_list(app_state: &AppState) -> Vec<DisplayState> {
    app_state.coordinator.lock().await.device_list()
}

pub async fn display_state(app_state: &AppState, device_id: &str) -> Result<DisplayState, String> {
    let coordinator = app_state.coordinator.lock().await;
    coordinator
        .display_state(&DeviceId::from(device_id))
        .map_err(|e| e.to_string())
}

/// Whether the device has a recorded service with this UUID
///
/// # Arguments
/// * `device_id` - The adapter-assigned identity
/// * `service_uuid` - Hyphenated UUID string
pub async fn supports_service(
    app_state: &AppState,
    device_id: &str,
    service_uuid: &str,
) -> Result<bool, String> {
    let uuid = Uuid::parse_str(service_uuid).map_err(|e| e.to_string())?;
    let coordinator = app_state.coordinator.lock().await;
    coordinator
        .supports(&DeviceId::from(device_id), &uuid)
        .map_err(|e| e.to_string())
}

/// Attaches a detail view. The coordinator keeps only a weak reference.
pub async fn open_details(
    app_state: &AppState,
    device_id: &str,
    observer: &Arc<dyn DetailsObserver>,
) -> Result<(), String> {
    let mut coordinator = app_state.coordinator.lock().await;
    coordinator
        .open_details(&DeviceId::from(device_id), observer)
        .map_err(|e| e.to_string())
}

pub async fn close_details(app_state: &AppState, device_id: &str) -> Result<(), String> {
    let mut coordinator = app_state.coordinator.lock().await;
    coordinator
        .close_details(&DeviceId::from(device_id))
        .map_err(|e| e.to_string())
}

/// Sends `text` over the device's UART link
pub async fn send_text(app_state: &AppState, device_id: &str, text: &str) -> Result<(), String> {
    let mut coordinator = app_state.coordinator.lock().await;
    coordinator
        .send_text(&DeviceId::from(device_id), text)
        .map_err(|e| e.to_string())
}

/// Typed text from the console; sent according to the console options
pub async fn console_input(app_state: &AppState, device_id: &str, text: &str) -> Result<(), String> {
    let mut coordinator = app_state.coordinator.lock().await;
    coordinator
        .console_input(&DeviceId::from(device_id), text)
        .map_err(|e| e.to_string())
}

/// The console's Send button
pub async fn console_send(app_state: &AppState, device_id: &str) -> Result<(), String> {
    let mut coordinator = app_state.coordinator.lock().await;
    coordinator
        .console_send(&DeviceId::from(device_id))
        .map_err(|e| e.to_string())
}

pub async fn set_receive_enabled(
    app_state: &AppState,
    device_id: &str,
    enabled: bool,
) -> Result<(), String> {
    let mut coordinator = app_state.coordinator.lock().await;
    coordinator
        .set_receive_enabled(&DeviceId::from(device_id), enabled)
        .map_err(|e| e.to_string())
}

/// Forgets every discovered device; scanning continues
pub async fn reset_discovery(app_state: &AppState) {
    app_state.coordinator.lock().await.reset();
}

/// Writes the device's UART transcript to `path` as plain text
pub async fn export_uart_text(
    app_state: &AppState,
    device_id: &str,
    path: &Path,
) -> Result<(), String> {
    let text = {
        let coordinator = app_state.coordinator.lock().await;
        coordinator
            .export_uart_text(&DeviceId::from(device_id))
            .map_err(|e| e.to_string())?
    };
    tokio::fs::write(path, text)
        .await
        .map_err(|e| crate::error::BuddyError::from(e).to_string())?;
    info!("UART text of {} exported to {:?}", device_id, path);
    Ok(())
}
