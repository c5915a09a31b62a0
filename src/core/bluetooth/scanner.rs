use bluest::{Adapter, AdapterEvent as RadioEvent, AdvertisingDevice};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::adapter::{AdapterEvent, EventSender};
use crate::core::bluetooth::connection::GattCache;
use crate::core::bluetooth::constants::RSSI_UNAVAILABLE;
use crate::core::bluetooth::device::{AdvertisementInfo, DeviceId};
use crate::core::bluetooth::types::AdapterState;

/// Runs the platform scan and forwards every advertisement, duplicates included
pub struct BluetoothScanner {
    adapter: Adapter,
    cache: GattCache,
    events: EventSender,
    cancel_token: CancellationToken,
    scan_task_handle: Option<JoinHandle<()>>,
}

impl BluetoothScanner {
    pub fn new(adapter: Adapter, cache: GattCache, events: EventSender) -> Self {
        Self {
            adapter,
            cache,
            events,
            cancel_token: CancellationToken::new(),
            scan_task_handle: None,
        }
    }

    pub fn start_scan(&mut self) {
        if self.scan_task_handle.is_some() {
            self.stop_scan();
        }

        self.cancel_token = CancellationToken::new();
        let cancel_token_for_task = self.cancel_token.clone();
        let adapter_for_task = self.adapter.clone();
        let cache_for_task = self.cache.clone();
        let events_for_task = self.events.clone();

        let handle = tokio::spawn(async move {
            Self::internal_scan_task(
                adapter_for_task,
                cache_for_task,
                events_for_task,
                cancel_token_for_task,
            )
            .await;
        });

        self.scan_task_handle = Some(handle);
        info!("Device scan task started.");
    }

    /// Scans with no service filter until cancelled
    async fn internal_scan_task(
        adapter: Adapter,
        cache: GattCache,
        events: EventSender,
        cancel_token: CancellationToken,
    ) {
        info!("Starting bluetooth scan");
        let mut scan_stream = match adapter.scan(&[]).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to start scan: {}", e);
                return;
            }
        };

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered) => {
                            let event = Self::advertisement_event(&cache, discovered);
                            if events.send(event.into()).is_err() {
                                break;
                            }
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
    }

    fn advertisement_event(cache: &GattCache, discovered: AdvertisingDevice) -> AdapterEvent {
        let device = discovered.device;
        let adv_data = discovered.adv_data;
        let rssi = discovered.rssi;
        let id = DeviceId::new(device.id().to_string());
        let name = device.name().ok().or_else(|| adv_data.local_name.clone());
        debug!("Found device - ID: {}, Name: {:?}, RSSI: {:?}", id, name, rssi);

        cache.insert_device(id.clone(), device);
        AdapterEvent::Advertisement {
            id,
            name,
            advertisement: AdvertisementInfo {
                local_name: adv_data.local_name,
                services: adv_data.services,
                tx_power_level: adv_data.tx_power_level,
                is_connectable: Some(adv_data.is_connectable),
            },
            rssi: rssi.unwrap_or(RSSI_UNAVAILABLE),
        }
    }

    pub fn stop_scan(&mut self) {
        info!("Stopping Bluetooth scan.");
        self.cancel_token.cancel();
        // the task exits on its own once it sees the cancellation
        if self.scan_task_handle.take().is_none() {
            debug!("No active scan task handle found.");
        }
    }
}

impl Drop for BluetoothScanner {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Reports the adapter's availability now and on every later change
pub async fn watch_adapter_state(
    adapter: Adapter,
    events: EventSender,
    cancel_token: CancellationToken,
) {
    let initial = match adapter.is_available().await {
        Ok(true) => AdapterState::PoweredOn,
        Ok(false) => AdapterState::PoweredOff,
        Err(e) => {
            warn!("Could not query adapter availability: {}", e);
            AdapterState::Unknown
        }
    };
    if events
        .send(AdapterEvent::StateChanged(initial).into())
        .is_err()
    {
        return;
    }

    let mut radio_events = match adapter.events().await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to watch adapter events: {}", e);
            return;
        }
    };

    loop {
        tokio::select! {
            result = radio_events.next() => {
                let state = match result {
                    Some(Ok(RadioEvent::Available)) => AdapterState::PoweredOn,
                    Some(Ok(RadioEvent::Unavailable)) => AdapterState::PoweredOff,
                    #[allow(unreachable_patterns)]
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("Adapter event error: {}", e);
                        AdapterState::Unknown
                    }
                    None => {
                        info!("Adapter event stream has ended.");
                        break;
                    }
                };
                if events.send(AdapterEvent::StateChanged(state).into()).is_err() {
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                break;
            }
        }
    }
}
