//! Proxy statistics
//!
//! Cheap atomic counters, per interface and for the session core.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-interface NDP traffic counters
#[derive(Debug, Default)]
pub struct InterfaceStats {
    pub solicits_rx: Counter,
    pub solicits_tx: Counter,
    pub adverts_rx: Counter,
    pub adverts_tx: Counter,
    pub tx_errors: Counter,
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    interfaces: RwLock<HashMap<String, Arc<InterfaceStats>>>,

    /// Sessions opened by solicitations
    pub sessions_created: Counter,
    /// Waiting sessions that timed out into the negative cache
    pub sessions_invalidated: Counter,
    /// Valid/Invalid sessions whose lifetime ran out
    pub sessions_expired: Counter,
    /// Solicitations no proxy was serving
    pub solicits_ignored: Counter,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_interface(&self, name: &str) -> Arc<InterfaceStats> {
        let mut interfaces = self.interfaces.write().unwrap();
        interfaces.entry(name.to_string()).or_default().clone()
    }

    pub fn interface(&self, name: &str) -> Option<Arc<InterfaceStats>> {
        self.interfaces.read().unwrap().get(name).cloned()
    }
}
