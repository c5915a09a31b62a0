//! Device identity and advertisement data

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

/// Opaque identity assigned by the local adapter.
/// Stable for the lifetime of the process only; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Recovers a MAC address embedded in the platform id, if there is one.
    /// macOS ids are random UUIDs and yield `None`.
    pub fn mac_address(&self) -> Option<String> {
        static MAC_RE: OnceLock<Option<Regex>> = OnceLock::new();
        let re = MAC_RE
            .get_or_init(|| Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok())
            .as_ref()?;
        re.find_iter(&self.0)
            .last()
            .map(|m| m.as_str().to_uppercase())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Latest advertisement payload seen for a device
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdvertisementInfo {
    /// Local name carried in the advertisement, a fallback for the peripheral name
    pub local_name: Option<String>,
    /// Advertised service UUIDs
    pub services: Vec<Uuid>,
    /// Transmit power in dBm, usually +4 down to -30
    pub tx_power_level: Option<i16>,
    /// `None` when the platform did not report connectability
    pub is_connectable: Option<bool>,
}
