//! Constants used throughout the application
//! This module contains all the constant values used in the application,
//! such as UUIDs, timeouts, and other configuration values.

use uuid::Uuid;

/// Standard Bluetooth Service UUIDs
pub const UUID_GENERIC_ACCESS_SERVICE: Uuid = Uuid::from_u128(0x00001800_0000_1000_8000_00805f9b34fb);
pub const UUID_GENERIC_ATTRIBUTE_SERVICE: Uuid = Uuid::from_u128(0x00001801_0000_1000_8000_00805f9b34fb);
pub const UUID_CURRENT_TIME_SERVICE: Uuid = Uuid::from_u128(0x00001805_0000_1000_8000_00805f9b34fb);
pub const UUID_DEVICE_INFORMATION_SERVICE: Uuid = Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth Characteristic UUIDs
pub const UUID_DEVICE_NAME: Uuid = Uuid::from_u128(0x00002a00_0000_1000_8000_00805f9b34fb);
pub const UUID_LOCAL_TIME_INFORMATION: Uuid = Uuid::from_u128(0x00002a0f_0000_1000_8000_00805f9b34fb);
pub const UUID_BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);
pub const UUID_CURRENT_TIME: Uuid = Uuid::from_u128(0x00002a2b_0000_1000_8000_00805f9b34fb);
pub const UUID_MANUFACTURER_NAME: Uuid = Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb);
pub const UUID_MODEL_NUMBER: Uuid = Uuid::from_u128(0x00002a24_0000_1000_8000_00805f9b34fb);

/// Nordic-style UART service (Adafruit Bluefruit firmware)
pub const UUID_UART_SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// Outbound UART characteristic: the central writes here
pub const UUID_UART_TX_CHAR: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// Inbound UART characteristic: the peripheral notifies here
pub const UUID_UART_RX_CHAR: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Legacy Nordic DFU service. Only detected, never driven.
pub const UUID_DFU_SERVICE: Uuid = Uuid::from_u128(0x00001530_1212_efde_1523_785feabcd123);
pub const UUID_DFU_CONTROL_POINT: Uuid = Uuid::from_u128(0x00001531_1212_efde_1523_785feabcd123);
pub const UUID_DFU_PACKET: Uuid = Uuid::from_u128(0x00001532_1212_efde_1523_785feabcd123);
pub const UUID_DFU_VERSION: Uuid = Uuid::from_u128(0x00001534_1212_efde_1523_785feabcd123);

/// RSSI value meaning "not available"
pub const RSSI_UNAVAILABLE: i16 = 127;

/// Seconds without an advertisement after which a record goes disabled
pub const DEFAULT_LIVENESS_TIMEOUT_SECS: u64 = 20;

/// Delay between first sighting and the connection attempt, in milliseconds
pub const DEFAULT_CONNECT_DELAY_MS: u64 = 100;

/// Largest payload written to the UART Tx characteristic in one request
pub const UART_CHUNK_SIZE: usize = 20;

/// Signal strength bar thresholds in dBm, weakest first
pub const SIGNAL_BAR_THRESHOLDS: [i16; 4] = [-84, -72, -60, -48];
