//! Link and GATT operations against the platform adapter
//! Connects, discovers and reads through `bluest`, caching the platform
//! handles by device identity so later requests can find them again. Every
//! outcome is posted back as an adapter event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bluest::{Adapter, Characteristic, Device, Service};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::core::bluetooth::adapter::{AdapterEvent, EventSender};
use crate::core::bluetooth::device::DeviceId;
use crate::core::bluetooth::types::{
    CharacteristicInfo, CharacteristicProperties, ServiceInfo, WriteMode,
};
use crate::core::scheduler::next_stamp;

/// Key of a cached characteristic: device, service, characteristic
pub type CharacteristicKey = (DeviceId, Uuid, Uuid);

#[derive(Default)]
struct CacheInner {
    devices: HashMap<DeviceId, Device>,
    services: HashMap<(DeviceId, Uuid), Service>,
    characteristics: HashMap<CharacteristicKey, Characteristic>,
}

/// Platform handles seen so far, shared by the scanner and the connection manager
#[derive(Clone, Default)]
pub struct GattCache {
    inner: Arc<Mutex<CacheInner>>,
}

impl GattCache {
    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_device(&self, id: DeviceId, device: Device) {
        self.lock().devices.insert(id, device);
    }

    pub fn device(&self, id: &DeviceId) -> Option<Device> {
        self.lock().devices.get(id).cloned()
    }

    fn service(&self, id: &DeviceId, uuid: Uuid) -> Option<Service> {
        self.lock().services.get(&(id.clone(), uuid)).cloned()
    }

    pub fn characteristic(&self, key: &CharacteristicKey) -> Option<Characteristic> {
        self.lock().characteristics.get(key).cloned()
    }

    /// Drops the GATT handles of `id`; they do not survive a disconnect
    fn forget_gatt(&self, id: &DeviceId) {
        let mut inner = self.lock();
        inner.services.retain(|(device, _), _| device != id);
        inner.characteristics.retain(|(device, _, _), _| device != id);
    }

    /// Drops everything, devices included
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.devices.clear();
        inner.services.clear();
        inner.characteristics.clear();
    }
}

/// Connects still waiting on the platform, so a disconnect can overtake them
#[derive(Clone, Default)]
pub struct InFlightConnects {
    /// ticket of the latest connect per device, and whether it was cancelled
    inner: Arc<Mutex<HashMap<DeviceId, (u64, bool)>>>,
}

impl InFlightConnects {
    fn lock(&self) -> MutexGuard<'_, HashMap<DeviceId, (u64, bool)>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a connect attempt; the ticket identifies it to `finish`
    pub fn begin(&self, id: &DeviceId) -> u64 {
        let ticket = next_stamp();
        self.lock().insert(id.clone(), (ticket, false));
        ticket
    }

    /// Marks the pending connect of `id` as overtaken. False if none is pending.
    pub fn cancel(&self, id: &DeviceId) -> bool {
        match self.lock().get_mut(id) {
            Some((_, cancelled)) => {
                *cancelled = true;
                true
            }
            None => false,
        }
    }

    /// Ends the attempt. True when a disconnect overtook it, in which case the
    /// resulting link must be closed again.
    pub fn finish(&self, id: &DeviceId, ticket: u64) -> bool {
        let mut inner = self.lock();
        match inner.get(id) {
            Some(&(current, cancelled)) if current == ticket => {
                inner.remove(id);
                cancelled
            }
            _ => false,
        }
    }
}

pub fn characteristic_key(id: &DeviceId, characteristic: &CharacteristicInfo) -> CharacteristicKey {
    (id.clone(), characteristic.service, characteristic.uuid)
}

/// Connection manager for discovered peripherals
#[derive(Clone)]
pub struct ConnectionManager {
    adapter: Adapter,
    cache: GattCache,
    events: EventSender,
    in_flight: InFlightConnects,
}

impl ConnectionManager {
    pub fn new(adapter: Adapter, cache: GattCache, events: EventSender) -> Self {
        Self {
            adapter,
            cache,
            events,
            in_flight: InFlightConnects::default(),
        }
    }

    fn emit(&self, event: AdapterEvent) {
        if self.events.send(event.into()).is_err() {
            debug!("Coordinator gone, dropping adapter event");
        }
    }

    /// Reports a failed operation. If the link turned out to be gone, the
    /// loss is reported instead so the session sees one disconnect.
    async fn fail(&self, device: &Device, id: &DeviceId, reason: String, event: AdapterEvent) {
        if device.is_connected().await {
            self.emit(event);
        } else {
            warn!("Link to {} lost: {}", id, reason);
            self.cache.forget_gatt(id);
            self.emit(AdapterEvent::Disconnected {
                id: id.clone(),
                reason: Some(reason),
            });
        }
    }

    pub async fn connect(&self, id: DeviceId) {
        let Some(device) = self.cache.device(&id) else {
            self.emit(AdapterEvent::ConnectFailed {
                id,
                reason: "device is no longer known to the adapter".to_string(),
            });
            return;
        };

        if device.is_connected().await {
            debug!("{} already connected", id);
            self.emit(AdapterEvent::Connected { id });
            return;
        }

        info!("Initiating connection to {}...", id);
        let ticket = self.in_flight.begin(&id);
        let result = self.adapter.connect_device(&device).await;
        if self.in_flight.finish(&id, ticket) {
            info!("Connection to {} was cancelled while in flight", id);
            if result.is_ok() {
                if let Err(e) = self.adapter.disconnect_device(&device).await {
                    warn!("Disconnect from {} failed: {}", id, e);
                }
            }
            return;
        }
        match result {
            Ok(()) => {
                info!("Connected to {}", id);
                self.emit(AdapterEvent::Connected { id });
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", id, e);
                self.emit(AdapterEvent::ConnectFailed {
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }

    pub async fn disconnect(&self, id: DeviceId) {
        if self.in_flight.cancel(&id) {
            debug!("Cancelling pending connection to {}", id);
        }
        self.cache.forget_gatt(&id);
        if let Some(device) = self.cache.device(&id) {
            if device.is_connected().await {
                info!("Disconnecting from device {}", id);
                if let Err(e) = self.adapter.disconnect_device(&device).await {
                    warn!("Disconnect from {} failed: {}", id, e);
                }
            } else {
                debug!("Device {} not connected", id);
            }
        }
        self.emit(AdapterEvent::Disconnected { id, reason: None });
    }

    pub async fn discover_services(&self, id: DeviceId) {
        let Some(device) = self.cache.device(&id) else {
            self.emit(AdapterEvent::ServicesDiscovered {
                id,
                result: Err("device is no longer known to the adapter".to_string()),
            });
            return;
        };

        match device.discover_services().await {
            Ok(services) => {
                let mut infos = Vec::with_capacity(services.len());
                for service in services {
                    let info = ServiceInfo {
                        uuid: service.uuid(),
                        is_primary: service.is_primary().await.unwrap_or(true),
                    };
                    debug!("{} service {}", id, info.uuid);
                    self.cache
                        .lock()
                        .services
                        .insert((id.clone(), info.uuid), service);
                    infos.push(info);
                }
                self.emit(AdapterEvent::ServicesDiscovered {
                    id,
                    result: Ok(infos),
                });
            }
            Err(e) => {
                let reason = e.to_string();
                let event = AdapterEvent::ServicesDiscovered {
                    id: id.clone(),
                    result: Err(reason.clone()),
                };
                self.fail(&device, &id, reason, event).await;
            }
        }
    }

    pub async fn discover_characteristics(&self, id: DeviceId, service: ServiceInfo) {
        let (Some(device), Some(handle)) = (self.cache.device(&id), self.cache.service(&id, service.uuid))
        else {
            self.emit(AdapterEvent::CharacteristicsDiscovered {
                id,
                service,
                result: Err("service was not discovered on this link".to_string()),
            });
            return;
        };

        match handle.discover_characteristics().await {
            Ok(characteristics) => {
                let mut infos = Vec::with_capacity(characteristics.len());
                for characteristic in characteristics {
                    let info = CharacteristicInfo::new(
                        characteristic.uuid(),
                        service.uuid,
                        properties_of(&characteristic).await,
                    );
                    self.cache
                        .lock()
                        .characteristics
                        .insert(characteristic_key(&id, &info), characteristic);
                    infos.push(info);
                }
                self.emit(AdapterEvent::CharacteristicsDiscovered {
                    id,
                    service,
                    result: Ok(infos),
                });
            }
            Err(e) => {
                let reason = e.to_string();
                let event = AdapterEvent::CharacteristicsDiscovered {
                    id: id.clone(),
                    service,
                    result: Err(reason.clone()),
                };
                self.fail(&device, &id, reason, event).await;
            }
        }
    }

    pub async fn read_value(&self, id: DeviceId, characteristic: CharacteristicInfo) {
        let key = characteristic_key(&id, &characteristic);
        let (Some(device), Some(handle)) = (self.cache.device(&id), self.cache.characteristic(&key))
        else {
            self.emit(AdapterEvent::ValueUpdated {
                id,
                characteristic,
                result: Err("characteristic was not discovered on this link".to_string()),
            });
            return;
        };

        match handle.read().await {
            Ok(value) => self.emit(AdapterEvent::ValueUpdated {
                id,
                characteristic,
                result: Ok(value),
            }),
            Err(e) => {
                let reason = e.to_string();
                let event = AdapterEvent::ValueUpdated {
                    id: id.clone(),
                    characteristic,
                    result: Err(reason.clone()),
                };
                self.fail(&device, &id, reason, event).await;
            }
        }
    }

    pub async fn write_value(
        &self,
        id: DeviceId,
        characteristic: CharacteristicInfo,
        bytes: Vec<u8>,
        mode: WriteMode,
    ) {
        let key = characteristic_key(&id, &characteristic);
        let Some(handle) = self.cache.characteristic(&key) else {
            self.emit(AdapterEvent::WriteCompleted {
                id,
                characteristic,
                result: Err("characteristic was not discovered on this link".to_string()),
            });
            return;
        };

        let result = match mode {
            WriteMode::WithResponse => handle.write(&bytes).await,
            WriteMode::WithoutResponse => handle.write_without_response(&bytes).await,
        };
        self.emit(AdapterEvent::WriteCompleted {
            id,
            characteristic,
            result: result.map_err(|e| e.to_string()),
        });
    }
}

/// Capability flags as reported by the platform. Unknown flags read as none.
async fn properties_of(characteristic: &Characteristic) -> CharacteristicProperties {
    match characteristic.properties().await {
        Ok(props) => CharacteristicProperties {
            read: props.read,
            write: props.write,
            write_without_response: props.write_without_response,
            notify: props.notify,
            indicate: props.indicate,
        },
        Err(e) => {
            warn!(
                "Could not read properties of {}: {}",
                characteristic.uuid(),
                e
            );
            CharacteristicProperties::default()
        }
    }
}
