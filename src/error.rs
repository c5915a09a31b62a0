//! Error types for BLE Buddy
//!
//! Every failure the library can surface to a user is a `BuddyError`. None of
//! them is fatal: the coordinator converts them into a [`Notice`] and keeps
//! running.

use serde::Serialize;
use thiserror::Error;

use crate::core::bluetooth::{AdapterState, DeviceId};

/// Main error type for discovery, traversal and UART operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuddyError {
    /// The local radio is off, unauthorized, unsupported or resetting
    #[error("{}", .0.explanation())]
    AdapterUnavailable(AdapterState),

    /// A connection attempt was rejected or failed
    #[error("Failed to connect to {id}: {reason}")]
    ConnectFailed { id: DeviceId, reason: String },

    /// The link dropped with an error reason
    #[error("{id} disconnected: {reason}")]
    Disconnected { id: DeviceId, reason: String },

    /// Service or characteristic discovery failed
    #[error("Discovery failed on {id}: {reason}")]
    DiscoveryFailed { id: DeviceId, reason: String },

    /// A characteristic read failed
    #[error("Read failed on {id}: {reason}")]
    ReadFailed { id: DeviceId, reason: String },

    /// One outbound UART chunk could not be written
    #[error("Failed to write value to {id}: {reason}")]
    WriteFailed { id: DeviceId, reason: String },

    /// No record exists for this identity
    #[error("Unknown device: {0}")]
    UnknownDevice(DeviceId),

    /// The device has no bound UART Tx characteristic or no live link
    #[error("UART service not available on {0}")]
    UartUnavailable(DeviceId),

    /// The adapter never answered within the configured window
    #[error("Operation timed out on {id} after {secs}s")]
    Timeout { id: DeviceId, secs: u64 },

    /// Config or export file problem
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BuddyError {
    fn from(e: std::io::Error) -> Self {
        BuddyError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for BuddyError {
    fn from(e: serde_json::Error) -> Self {
        BuddyError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BuddyError>;

/// A dismissable, user-visible notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub detail: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: detail.into(),
        }
    }
}

impl From<&BuddyError> for Notice {
    fn from(e: &BuddyError) -> Self {
        let title = match e {
            BuddyError::AdapterUnavailable(_) => "Bluetooth snag",
            BuddyError::ConnectFailed { .. } | BuddyError::Timeout { .. } => "Failed to connect",
            BuddyError::Disconnected { .. } => "Peripheral disconnected",
            BuddyError::DiscoveryFailed { .. } => "Failed to discover",
            BuddyError::ReadFailed { .. } => "Failed to read value",
            BuddyError::WriteFailed { .. } => "Failed to write value",
            BuddyError::UnknownDevice(_) | BuddyError::UartUnavailable(_) => "Device unavailable",
            BuddyError::Io(_) => "File not saved",
        };
        Notice::new(title, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_errors_use_the_bluetooth_snag_title() {
        let err = BuddyError::AdapterUnavailable(AdapterState::PoweredOff);
        let notice = Notice::from(&err);
        assert_eq!(notice.title, "Bluetooth snag");
        assert!(notice.detail.contains("powered off"));
    }

    #[test]
    fn write_failures_name_the_device() {
        let err = BuddyError::WriteFailed {
            id: DeviceId::from("dev-1"),
            reason: "gatt busy".into(),
        };
        let notice = Notice::from(&err);
        assert_eq!(notice.title, "Failed to write value");
        assert_eq!(notice.detail, "Failed to write value to dev-1: gatt busy");
    }
}
