//! Well-known GATT UUIDs
//!
//! 16-bit UUIDs are assigned by the Bluetooth SIG and live on the base UUID
//! `0000xxxx-0000-1000-8000-00805F9B34FB`; 128-bit UUIDs are vendor specific.
//! Unknown UUIDs render as their short (16-bit) or full uppercase form.

use uuid::Uuid;

use super::constants::*;

const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;
const SHORT_UUID_MASK: u128 = 0xffff_u128 << 96;

/// How a characteristic value is rendered for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// Single byte percentage, 0..=100
    BatteryLevel,
    /// Single byte, 0x0..=0xF
    CurrentTime,
    /// Time zone byte followed by DST offset byte
    LocalTimeInformation,
    /// Raw hex, never decoded as text
    RawHex,
    /// NUL-terminated UTF-8
    Text,
}

static KNOWN_UUIDS: &[(Uuid, &str)] = &[
    // Services
    (UUID_GENERIC_ACCESS_SERVICE, "Generic Access"),
    (UUID_GENERIC_ATTRIBUTE_SERVICE, "Generic Attribute"),
    (Uuid::from_u128(0x00001802_0000_1000_8000_00805f9b34fb), "Immediate Alert"),
    (Uuid::from_u128(0x00001803_0000_1000_8000_00805f9b34fb), "Link Loss"),
    (Uuid::from_u128(0x00001804_0000_1000_8000_00805f9b34fb), "Tx Power"),
    (UUID_CURRENT_TIME_SERVICE, "Current Time Service"),
    (Uuid::from_u128(0x00001809_0000_1000_8000_00805f9b34fb), "Health Thermometer"),
    (UUID_DEVICE_INFORMATION_SERVICE, "Device Information"),
    (Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb), "Heart Rate"),
    (UUID_BATTERY_SERVICE, "Battery Service"),
    (Uuid::from_u128(0x00001812_0000_1000_8000_00805f9b34fb), "Human Interface Device"),
    (UUID_UART_SERVICE, "UART Service"),
    (UUID_DFU_SERVICE, "Device Firmware Update Service"),
    // Characteristics
    (UUID_DEVICE_NAME, "Device Name"),
    (Uuid::from_u128(0x00002a01_0000_1000_8000_00805f9b34fb), "Appearance"),
    (Uuid::from_u128(0x00002a04_0000_1000_8000_00805f9b34fb), "Peripheral Preferred Connection Parameters"),
    (Uuid::from_u128(0x00002a05_0000_1000_8000_00805f9b34fb), "Service Changed"),
    (Uuid::from_u128(0x00002a07_0000_1000_8000_00805f9b34fb), "Tx Power Level"),
    (UUID_LOCAL_TIME_INFORMATION, "Local Time Information"),
    (UUID_BATTERY_LEVEL, "Battery Level"),
    (Uuid::from_u128(0x00002a23_0000_1000_8000_00805f9b34fb), "System ID"),
    (UUID_MODEL_NUMBER, "Model Number String"),
    (Uuid::from_u128(0x00002a25_0000_1000_8000_00805f9b34fb), "Serial Number String"),
    (Uuid::from_u128(0x00002a26_0000_1000_8000_00805f9b34fb), "Firmware Revision String"),
    (Uuid::from_u128(0x00002a27_0000_1000_8000_00805f9b34fb), "Hardware Revision String"),
    (Uuid::from_u128(0x00002a28_0000_1000_8000_00805f9b34fb), "Software Revision String"),
    (UUID_MANUFACTURER_NAME, "Manufacturer Name String"),
    (Uuid::from_u128(0x00002a2a_0000_1000_8000_00805f9b34fb), "IEEE 11073-20601 Regulatory Certification Data List"),
    (UUID_CURRENT_TIME, "Current Time"),
    (Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb), "Heart Rate Measurement"),
    (Uuid::from_u128(0x00002a38_0000_1000_8000_00805f9b34fb), "Body Sensor Location"),
    (Uuid::from_u128(0x00002a50_0000_1000_8000_00805f9b34fb), "PnP ID"),
    (UUID_UART_TX_CHAR, "UART Tx"),
    (UUID_UART_RX_CHAR, "UART Rx"),
    (UUID_DFU_CONTROL_POINT, "DFU Control Point"),
    (UUID_DFU_PACKET, "DFU Packet"),
    (UUID_DFU_VERSION, "DFU Version"),
];

/// Human-readable name for a service or characteristic UUID
pub fn uuid_name(uuid: &Uuid) -> String {
    KNOWN_UUIDS
        .iter()
        .find(|(known, _)| known == uuid)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| short_uuid_string(uuid))
}

/// "2A19" for SIG-assigned UUIDs, the full uppercase form otherwise
pub fn short_uuid_string(uuid: &Uuid) -> String {
    let value = uuid.as_u128();
    if value & !SHORT_UUID_MASK == BLUETOOTH_BASE_UUID {
        format!("{:04X}", (value >> 96) as u16)
    } else {
        uuid.hyphenated().to_string().to_uppercase()
    }
}

/// Picks the special-cased decoder for a characteristic, if any
pub fn value_format(uuid: &Uuid) -> ValueFormat {
    match *uuid {
        UUID_BATTERY_LEVEL => ValueFormat::BatteryLevel,
        UUID_CURRENT_TIME => ValueFormat::CurrentTime,
        UUID_LOCAL_TIME_INFORMATION => ValueFormat::LocalTimeInformation,
        UUID_DFU_VERSION => ValueFormat::RawHex,
        _ => ValueFormat::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_uuids_have_names() {
        assert_eq!(uuid_name(&UUID_BATTERY_LEVEL), "Battery Level");
        assert_eq!(uuid_name(&UUID_UART_SERVICE), "UART Service");
        assert_eq!(uuid_name(&UUID_DFU_VERSION), "DFU Version");
    }

    #[test]
    fn unknown_sig_uuids_render_short() {
        let uuid = Uuid::from_u128(0x0000feed_0000_1000_8000_00805f9b34fb);
        assert_eq!(uuid_name(&uuid), "FEED");
    }

    #[test]
    fn unknown_vendor_uuids_render_in_full() {
        let uuid = Uuid::from_u128(0x12345678_9abc_def0_1234_56789abcdef0);
        assert_eq!(uuid_name(&uuid), "12345678-9ABC-DEF0-1234-56789ABCDEF0");
    }

    #[test]
    fn special_decoders_are_selected_by_uuid() {
        assert_eq!(value_format(&UUID_BATTERY_LEVEL), ValueFormat::BatteryLevel);
        assert_eq!(value_format(&UUID_DFU_VERSION), ValueFormat::RawHex);
        assert_eq!(value_format(&UUID_DEVICE_NAME), ValueFormat::Text);
    }
}
