//! Injection state machine
//!
//! ```text
//! UNINJECTED ──inject──> INJECTED ──uninject / close──> DETACHED
//!      └──────────── injection failure ──────────────────────┘
//! ```
//!
//! `DETACHED` is final.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InjectionState {
    Uninjected = 0,
    Injected = 1,
    Detached = 2,
}

impl InjectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninjected,
            1 => Self::Injected,
            _ => Self::Detached,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninjected => "uninjected",
            Self::Injected => "injected",
            Self::Detached => "detached",
        }
    }
}

impl fmt::Display for InjectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free cell holding an [`InjectionState`]
#[derive(Debug)]
pub struct AtomicInjectionState(AtomicU8);

impl AtomicInjectionState {
    pub const fn new() -> Self {
        Self(AtomicU8::new(InjectionState::Uninjected as u8))
    }

    pub fn load(&self) -> InjectionState {
        InjectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `current` to `next`; fails with the actual state
    pub fn transition(&self, current: InjectionState, next: InjectionState) -> Result<(), InjectionState> {
        self.0
            .compare_exchange(current as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(InjectionState::from_u8)
    }

    /// Move to `DETACHED`, returning the previous state
    pub fn detach(&self) -> InjectionState {
        InjectionState::from_u8(self.0.swap(InjectionState::Detached as u8, Ordering::AcqRel))
    }
}

impl Default for AtomicInjectionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let state = AtomicInjectionState::new();
        assert_eq!(state.load(), InjectionState::Uninjected);

        state
            .transition(InjectionState::Uninjected, InjectionState::Injected)
            .unwrap();
        assert_eq!(
            state.transition(InjectionState::Uninjected, InjectionState::Injected),
            Err(InjectionState::Injected)
        );

        assert_eq!(state.detach(), InjectionState::Injected);
        assert_eq!(state.detach(), InjectionState::Detached);
        assert_eq!(state.load().to_string(), "detached");
    }
}
