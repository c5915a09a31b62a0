//! Radio adapter backed by the platform Bluetooth stack
//! Every request is spawned onto the runtime and answered with an adapter
//! event, so callers on the coordinator's context never wait on the radio.

use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, Result};
use bluest::Adapter;
use log::{debug, info};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::adapter::{EventSender, RadioAdapter};
use crate::core::bluetooth::connection::{characteristic_key, ConnectionManager, GattCache};
use crate::core::bluetooth::device::DeviceId;
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::scanner::{watch_adapter_state, BluetoothScanner};
use crate::core::bluetooth::types::{CharacteristicInfo, ServiceInfo, WriteMode};

pub struct BluestAdapter {
    runtime: Handle,
    cache: GattCache,
    connection_manager: ConnectionManager,
    scanner: Mutex<BluetoothScanner>,
    notification_handler: NotificationHandler,
    cancel_token: CancellationToken,
}

impl BluestAdapter {
    /// Acquires the system adapter and starts reporting its state on `events`.
    /// Must be called from within a tokio runtime.
    pub async fn new(events: EventSender) -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        info!("Bluetooth adapter acquired.");

        let runtime = Handle::current();
        let cache = GattCache::default();
        let cancel_token = CancellationToken::new();
        runtime.spawn(watch_adapter_state(
            adapter.clone(),
            events.clone(),
            cancel_token.clone(),
        ));

        Ok(Self {
            runtime,
            connection_manager: ConnectionManager::new(adapter.clone(), cache.clone(), events.clone()),
            scanner: Mutex::new(BluetoothScanner::new(adapter, cache.clone(), events.clone())),
            notification_handler: NotificationHandler::new(events),
            cache,
            cancel_token,
        })
    }

    /// Stops the scan, every subscription and the state watcher
    pub fn shutdown(&self) {
        info!("Shutting down Bluetooth adapter.");
        self.stop_scan();
        self.notification_handler.unsubscribe_all();
        self.cancel_token.cancel();
        self.cache.clear();
    }
}

impl RadioAdapter for BluestAdapter {
    fn start_scan(&self) {
        let _guard = self.runtime.enter();
        self.scanner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .start_scan();
    }

    fn stop_scan(&self) {
        self.scanner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop_scan();
    }

    fn connect(&self, id: &DeviceId) {
        let manager = self.connection_manager.clone();
        let id = id.clone();
        self.runtime.spawn(async move { manager.connect(id).await });
    }

    fn discover_services(&self, id: &DeviceId) {
        let manager = self.connection_manager.clone();
        let id = id.clone();
        self.runtime
            .spawn(async move { manager.discover_services(id).await });
    }

    fn discover_characteristics(&self, id: &DeviceId, service: &ServiceInfo) {
        let manager = self.connection_manager.clone();
        let id = id.clone();
        let service = service.clone();
        self.runtime
            .spawn(async move { manager.discover_characteristics(id, service).await });
    }

    fn read_value(&self, id: &DeviceId, characteristic: &CharacteristicInfo) {
        let manager = self.connection_manager.clone();
        let id = id.clone();
        let characteristic = characteristic.clone();
        self.runtime
            .spawn(async move { manager.read_value(id, characteristic).await });
    }

    fn set_notify(&self, id: &DeviceId, characteristic: &CharacteristicInfo, enabled: bool) {
        let key = characteristic_key(id, characteristic);
        if !enabled {
            self.notification_handler.unsubscribe(&key);
            return;
        }
        if !characteristic.properties.notify && !characteristic.properties.indicate {
            debug!("{} does not notify, not subscribing", characteristic.uuid);
            return;
        }
        let (Some(device), Some(handle)) = (self.cache.device(id), self.cache.characteristic(&key))
        else {
            debug!("No handle for {} on {}, not subscribing", characteristic.uuid, id);
            return;
        };
        let _guard = self.runtime.enter();
        self.notification_handler
            .subscribe(key, characteristic.clone(), device, handle);
    }

    fn write_value(
        &self,
        id: &DeviceId,
        characteristic: &CharacteristicInfo,
        bytes: Vec<u8>,
        mode: WriteMode,
    ) {
        let manager = self.connection_manager.clone();
        let id = id.clone();
        let characteristic = characteristic.clone();
        self.runtime.spawn(async move {
            manager.write_value(id, characteristic, bytes, mode).await
        });
    }

    fn disconnect(&self, id: &DeviceId) {
        self.notification_handler.unsubscribe_device(id);
        let manager = self.connection_manager.clone();
        let id = id.clone();
        self.runtime.spawn(async move { manager.disconnect(id).await });
    }
}

impl Drop for BluestAdapter {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
