//! BLE Buddy library
//! Discovers nearby Bluetooth LE peripherals, walks each one's GATT tree once,
//! tracks whether it is still advertising, and offers a text channel to
//! devices exposing the UART service.

// Module declarations
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod state;
pub mod utils;

pub use error::{BuddyError, Notice};
