//! Bluetooth functionality for the BLE buddy
//! Everything between the platform radio and the per-device sessions: the
//! adapter boundary and its `bluest` implementation, scanning, connections,
//! notifications, and the session state machine with its UART channel.

pub mod adapter;
mod connection;
pub mod constants;
pub mod device;
pub mod fake;
pub mod liveness;
mod manager;
pub mod names;
mod notification;
pub mod peripheral;
mod scanner;
pub mod types;
pub mod uart;

// Re-export types that should be publicly accessible
pub use adapter::{AdapterEvent, CoordinatorEvent, RadioAdapter, TimerEvent};
pub use device::{AdvertisementInfo, DeviceId};
pub use manager::BluestAdapter;
pub use peripheral::{PeripheralSession, SessionPhase};
pub use types::{
    AdapterState, CharacteristicInfo, CharacteristicProperties, CharacteristicValue,
    ConnectionState, DisplayState, GattNode, ServiceInfo, WriteMode,
};
pub use uart::{UartConsole, WriteFailurePolicy};
