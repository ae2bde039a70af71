//! Per-listener invocation timings

use crate::listener::Listener;
use dashmap::DashMap;
use packettap_core::ListenerId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Accumulated statistics of one listener
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimingStats {
    pub name: String,
    pub invocations: u64,
    pub total: Duration,
    pub longest: Duration,
}

impl TimingStats {
    pub fn average(&self) -> Duration {
        if self.invocations == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.invocations);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Optional timing collection, off unless enabled
pub struct ListenerTimings {
    enabled: AtomicBool,
    stats: DashMap<ListenerId, TimingStats>,
}

impl ListenerTimings {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            stats: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn record(&self, listener: &Listener, elapsed: Duration) {
        let mut stats = self.stats.entry(listener.id()).or_insert_with(|| TimingStats {
            name: listener.name().to_string(),
            ..TimingStats::default()
        });
        stats.invocations += 1;
        stats.total += elapsed;
        stats.longest = stats.longest.max(elapsed);
    }

    pub fn get(&self, id: ListenerId) -> Option<TimingStats> {
        self.stats.get(&id).map(|stats| stats.clone())
    }

    /// All statistics, most expensive listener first
    pub fn snapshot(&self) -> Vec<TimingStats> {
        let mut all: Vec<TimingStats> = self.stats.iter().map(|entry| entry.value().clone()).collect();
        all.sort_by(|a, b| b.total.cmp(&a.total));
        all
    }

    /// Drop the statistics of an unregistered listener
    pub fn forget(&self, id: ListenerId) -> Option<TimingStats> {
        self.stats.remove(&id).map(|(_, stats)| stats)
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn reset(&self) {
        self.stats.clear();
    }
}

impl Default for ListenerTimings {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average() {
        let stats = TimingStats {
            name: "x".to_string(),
            invocations: 4,
            total: Duration::from_millis(8),
            longest: Duration::from_millis(5),
        };
        assert_eq!(stats.average(), Duration::from_millis(2));
        assert_eq!(TimingStats::default().average(), Duration::ZERO);
    }

    #[test]
    fn test_average_past_u32_invocations() {
        let busy = TimingStats {
            name: "busy".to_string(),
            invocations: (1 << 32) + 2,
            total: Duration::from_secs(10),
            longest: Duration::from_millis(1),
        };
        assert_eq!(busy.average(), Duration::from_nanos(2));

        let exact = TimingStats {
            invocations: 1 << 32,
            total: Duration::from_secs(43),
            ..busy
        };
        assert_eq!(exact.average(), Duration::from_nanos(10));
    }

    #[test]
    fn test_toggle() {
        let timings = ListenerTimings::default();
        assert!(!timings.is_enabled());
        timings.set_enabled(true);
        assert!(timings.is_enabled());
        assert!(timings.snapshot().is_empty());
    }
}
