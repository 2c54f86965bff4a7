//! Per-device connection event counters.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::ConnectionEvent;

/// Counts connection lifecycle events per device key.
///
/// Successful and rejected devices are keyed by node id; failed handshakes,
/// which never learn a node id, are keyed by remote address.
#[derive(Debug, Default)]
pub struct SessionStatistics {
    counters: RwLock<HashMap<String, HashMap<ConnectionEvent, u64>>>,
}

impl SessionStatistics {
    /// Empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one event for `device`.
    pub fn record(&self, device: &str, event: ConnectionEvent) {
        let mut counters = self.counters.write();
        *counters
            .entry(device.to_string())
            .or_default()
            .entry(event)
            .or_insert(0) += 1;
    }

    /// Events of one kind recorded for `device`.
    pub fn count(&self, device: &str, event: ConnectionEvent) -> u64 {
        self.counters
            .read()
            .get(device)
            .and_then(|events| events.get(&event))
            .copied()
            .unwrap_or(0)
    }

    /// Events of one kind across all devices.
    pub fn total(&self, event: ConnectionEvent) -> u64 {
        self.counters
            .read()
            .values()
            .filter_map(|events| events.get(&event))
            .sum()
    }

    /// Drop every counter of `device`.
    pub fn reset(&self, device: &str) {
        self.counters.write().remove(device);
    }
}
