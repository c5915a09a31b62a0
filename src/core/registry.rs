//! Registry of discovered devices
//!
//! Ordered by first sighting and keyed by identity. Entries are never removed
//! during a run; devices that stop advertising are only marked disabled. The
//! whole registry is cleared by an explicit reset.

use std::collections::HashMap;

use crate::core::bluetooth::device::DeviceId;
use crate::core::bluetooth::peripheral::PeripheralSession;

#[derive(Default)]
pub struct DeviceRegistry {
    sessions: Vec<PeripheralSession>,
    index: HashMap<DeviceId, usize>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &DeviceId) -> Option<&PeripheralSession> {
        self.index.get(id).map(|&i| &self.sessions[i])
    }

    pub fn get_mut(&mut self, id: &DeviceId) -> Option<&mut PeripheralSession> {
        self.index.get(id).map(|&i| &mut self.sessions[i])
    }

    /// Appends a session for an identity not seen before. Returns false and
    /// drops `session` if the identity is already registered.
    pub fn insert(&mut self, session: PeripheralSession) -> bool {
        if self.index.contains_key(session.id()) {
            return false;
        }
        self.index.insert(session.id().clone(), self.sessions.len());
        self.sessions.push(session);
        true
    }

    /// Sessions in first-sighting order
    pub fn iter(&self) -> impl Iterator<Item = &PeripheralSession> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Removes every session and returns them for teardown
    pub fn clear(&mut self) -> Vec<PeripheralSession> {
        self.index.clear();
        std::mem::take(&mut self.sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::session_config::SessionConfig;
    use crate::core::bluetooth::device::AdvertisementInfo;

    fn session(id: &str) -> PeripheralSession {
        PeripheralSession::new(
            DeviceId::from(id),
            None,
            AdvertisementInfo::default(),
            -70,
            &SessionConfig::default(),
        )
    }

    #[test]
    fn keeps_first_sighting_order_and_rejects_duplicates() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.insert(session("b")));
        assert!(registry.insert(session("a")));
        assert!(!registry.insert(session("b")));

        let ids: Vec<_> = registry.iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(registry.get(&DeviceId::from("a")).is_some());
    }

    #[test]
    fn clear_empties_everything() {
        let mut registry = DeviceRegistry::new();
        registry.insert(session("a"));
        assert_eq!(registry.clear().len(), 1);
        assert!(registry.is_empty());
        assert!(!registry.contains(&DeviceId::from("a")));
        assert!(registry.insert(session("a")));
    }
}
