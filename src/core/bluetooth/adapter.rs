//! Radio adapter boundary
//!
//! The adapter is request/response: every method returns immediately and the
//! outcome arrives later as an [`AdapterEvent`] on the coordinator's channel.
//! Each event carries the originating device identity so routing never relies
//! on object identity.

use tokio::sync::mpsc;

use crate::core::bluetooth::device::{AdvertisementInfo, DeviceId};
use crate::core::bluetooth::types::{
    AdapterState, CharacteristicInfo, ServiceInfo, WriteMode,
};

/// Callback payloads from the radio adapter
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    StateChanged(AdapterState),
    Advertisement {
        id: DeviceId,
        name: Option<String>,
        advertisement: AdvertisementInfo,
        rssi: i16,
    },
    Connected {
        id: DeviceId,
    },
    ConnectFailed {
        id: DeviceId,
        reason: String,
    },
    /// `reason` is `None` for a requested disconnect
    Disconnected {
        id: DeviceId,
        reason: Option<String>,
    },
    /// `Err` covers both transport errors and a missing service list
    ServicesDiscovered {
        id: DeviceId,
        result: Result<Vec<ServiceInfo>, String>,
    },
    CharacteristicsDiscovered {
        id: DeviceId,
        service: ServiceInfo,
        result: Result<Vec<CharacteristicInfo>, String>,
    },
    /// A read completed or a notification arrived
    ValueUpdated {
        id: DeviceId,
        characteristic: CharacteristicInfo,
        result: Result<Vec<u8>, String>,
    },
    WriteCompleted {
        id: DeviceId,
        characteristic: CharacteristicInfo,
        result: Result<(), String>,
    },
}

/// Timer firings posted back to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// The deferred first connection attempt is due
    ConnectDue(DeviceId),
    /// No advertisement arrived within the liveness window
    LivenessExpired { id: DeviceId, generation: u64 },
    /// A traversal request got no answer in time
    OperationTimedOut { id: DeviceId, step: u64 },
}

/// Everything the coordinator's event loop consumes
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    Adapter(AdapterEvent),
    Timer(TimerEvent),
}

impl From<AdapterEvent> for CoordinatorEvent {
    fn from(event: AdapterEvent) -> Self {
        CoordinatorEvent::Adapter(event)
    }
}

impl From<TimerEvent> for CoordinatorEvent {
    fn from(event: TimerEvent) -> Self {
        CoordinatorEvent::Timer(event)
    }
}

pub type EventSender = mpsc::UnboundedSender<CoordinatorEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<CoordinatorEvent>;

/// Consumed radio capability. Implementations must not block.
pub trait RadioAdapter: Send + Sync {
    /// Scan for every advertisement type, reporting duplicates
    fn start_scan(&self);
    fn stop_scan(&self);
    fn connect(&self, id: &DeviceId);
    /// Discover all services, no UUID filter
    fn discover_services(&self, id: &DeviceId);
    /// Discover all characteristics of `service`, no UUID filter
    fn discover_characteristics(&self, id: &DeviceId, service: &ServiceInfo);
    fn read_value(&self, id: &DeviceId, characteristic: &CharacteristicInfo);
    fn set_notify(&self, id: &DeviceId, characteristic: &CharacteristicInfo, enabled: bool);
    fn write_value(
        &self,
        id: &DeviceId,
        characteristic: &CharacteristicInfo,
        bytes: Vec<u8>,
        mode: WriteMode,
    );
    fn disconnect(&self, id: &DeviceId);
}
