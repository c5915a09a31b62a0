//! Defines shared data structures for the Bluetooth module.

use serde::Serialize;
use uuid::Uuid;

use crate::core::codec::render_value;
use crate::core::bluetooth::names::uuid_name;

/// Power/authorization state of the local radio adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdapterState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl AdapterState {
    /// Text shown to the user when the adapter is not usable
    pub fn explanation(&self) -> &'static str {
        match self {
            AdapterState::PoweredOn => "Bluetooth is available.",
            AdapterState::PoweredOff => {
                "Bluetooth is currently powered off. Enable Bluetooth in the System Settings."
            }
            AdapterState::Resetting => {
                "The connection was momentarily lost; an update is imminent. Try again shortly."
            }
            AdapterState::Unauthorized => {
                "This application is not authorized to use Bluetooth Low Energy."
            }
            AdapterState::Unsupported => "This computer does not support Bluetooth Low Energy.",
            AdapterState::Unknown => {
                "The current state of the Bluetooth adapter is unknown; an update is imminent. Try again shortly."
            }
        }
    }
}

/// Capability flags of a characteristic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

/// A service as reported by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub is_primary: bool,
}

impl ServiceInfo {
    pub fn new(uuid: Uuid) -> Self {
        Self { uuid, is_primary: true }
    }
}

/// A characteristic as reported by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    /// UUID of the owning service
    pub service: Uuid,
    pub properties: CharacteristicProperties,
}

impl CharacteristicInfo {
    pub fn new(uuid: Uuid, service: Uuid, properties: CharacteristicProperties) -> Self {
        Self {
            uuid,
            service,
            properties,
        }
    }
}

/// Acknowledged or unacknowledged characteristic write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

impl WriteMode {
    /// Prefer acknowledged writes when the characteristic offers them
    pub fn for_properties(properties: &CharacteristicProperties) -> Self {
        if properties.write {
            WriteMode::WithResponse
        } else {
            WriteMode::WithoutResponse
        }
    }
}

/// Value recorded for a characteristic node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CharacteristicValue {
    /// The characteristic does not permit reads
    NotReadable,
    Bytes(Vec<u8>),
    /// The read failed; traversal moved on without a value
    Failed(String),
}

/// One recorded entry of the GATT tree, in encounter order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GattNode {
    Service(ServiceInfo),
    Characteristic(CharacteristicInfo, CharacteristicValue),
}

impl GattNode {
    /// A display line: services flush left, characteristics indented with their value
    pub fn display_line(&self) -> String {
        match self {
            GattNode::Service(service) => uuid_name(&service.uuid),
            GattNode::Characteristic(characteristic, value) => {
                let name = uuid_name(&characteristic.uuid);
                match value {
                    CharacteristicValue::NotReadable => format!("    {}", name),
                    CharacteristicValue::Bytes(bytes) => {
                        format!("    {} \"{}\"", name, render_value(&characteristic.uuid, bytes))
                    }
                    CharacteristicValue::Failed(_) => format!("    {} \"n/a\"", name),
                }
            }
        }
    }
}

/// Link state as shown in the device list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    InUse,
    Connected,
    Connecting,
    Disconnected,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::InUse => "In Use",
            ConnectionState::Connected => "Connected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Disconnected => "Disconnected",
        }
    }
}

/// Snapshot of one record for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayState {
    pub id: String,
    pub address: Option<String>,
    pub name: String,
    /// `None` when unavailable ("n/a dBm")
    pub rssi: Option<i16>,
    /// 0 to 4
    pub signal_bars: u8,
    pub tx_power_level: Option<i16>,
    pub is_connectable: Option<bool>,
    pub advertised_services: Vec<String>,
    pub disabled: bool,
    pub connection: ConnectionState,
    pub selectable: bool,
    pub gatt_lines: Vec<String>,
    pub traversal_complete: bool,
}

impl DisplayState {
    pub fn rssi_label(&self) -> String {
        match self.rssi {
            Some(rssi) => format!("{} dBm", rssi),
            None => "n/a dBm".to_string(),
        }
    }
}
