//! Rate-limited reporting of listener faults

use crate::listener::Listener;
use dashmap::DashMap;
use packettap_core::{ListenerId, TapError};
use packettap_protocol::PacketType;
use std::sync::atomic::{AtomicU64, Ordering};

/// Logs listener faults, at most `max_reports` times per listener
///
/// Faults past the limit are still counted. Per-listener counts are dropped
/// with [`FaultReporter::forget`]; the total covers the process lifetime.
pub struct FaultReporter {
    max_reports: u64,
    counts: DashMap<ListenerId, u64>,
    total: AtomicU64,
}

impl FaultReporter {
    pub fn new(max_reports: u64) -> Self {
        Self {
            max_reports,
            counts: DashMap::new(),
            total: AtomicU64::new(0),
        }
    }

    pub fn max_reports(&self) -> u64 {
        self.max_reports
    }

    /// Record a fault and build the matching `ListenerFault`
    pub fn report(&self, listener: &Listener, packet: PacketType, message: String) -> TapError {
        let count = {
            let mut count = self.counts.entry(listener.id()).or_insert(0);
            *count += 1;
            *count
        };
        self.total.fetch_add(1, Ordering::Relaxed);

        if count <= self.max_reports {
            tracing::warn!("Listener {} failed on {}: {}", listener.name(), packet, message);
        }
        if count == self.max_reports + 1 {
            tracing::warn!(
                "Listener {} keeps failing; further faults will not be logged",
                listener.name()
            );
        }

        TapError::ListenerFault {
            listener: listener.name().to_string(),
            packet: packet.to_string(),
            message,
        }
    }

    /// Faults recorded for one listener
    pub fn fault_count(&self, id: ListenerId) -> u64 {
        self.counts.get(&id).map_or(0, |count| *count)
    }

    pub fn total_faults(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Drop the count of an unregistered listener
    pub fn forget(&self, id: ListenerId) -> bool {
        self.counts.remove(&id).is_some()
    }

    /// Listeners with a recorded fault
    pub fn tracked(&self) -> usize {
        self.counts.len()
    }
}
