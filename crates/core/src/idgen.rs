//! Sequential ID generation

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe generator of unique, increasing IDs
///
/// IDs start at 1; 0 is never handed out so it can be used as a sentinel.
pub struct IdGenerator<T: From<u64>> {
    next_id: AtomicU64,
    phantom: PhantomData<fn() -> T>,
}

impl<T: From<u64>> IdGenerator<T> {
    pub const fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            phantom: PhantomData,
        }
    }

    /// Get the next available ID
    pub fn next_id(&self) -> T {
        T::from(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of IDs handed out so far
    pub fn issued(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed) - 1
    }
}

impl<T: From<u64>> Default for IdGenerator<T> {
    fn default() -> Self {
        Self::new()
    }
}
