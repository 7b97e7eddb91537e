//! One-way shutdown flag.
//!
//! A [`Flag`] starts `active` and can be flipped to `inactive` exactly once.
//! Every component that needs an idempotent `close()` guards it with one:
//! only the caller that wins the compare-and-swap runs the teardown.

use std::sync::atomic::{AtomicU8, Ordering};

const ACTIVE: u8 = 0;
const INACTIVE: u8 = 1;

/// Atomic two-state flag with a single legal transition, `active → inactive`.
#[derive(Debug)]
pub struct Flag {
    state: AtomicU8,
}

impl Flag {
    /// Create a flag in the `active` state.
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ACTIVE),
        }
    }

    /// Point-in-time check for the `active` state.
    pub fn is_active(&self) -> bool {
        self.state.load(Ordering::Acquire) == ACTIVE
    }

    /// Point-in-time check for the `inactive` state.
    pub fn is_inactive(&self) -> bool {
        self.state.load(Ordering::Acquire) == INACTIVE
    }

    /// Flip the flag to `inactive`.
    ///
    /// Returns `true` only for the caller that performed the transition;
    /// every later call returns `false`.
    pub fn inactivate(&self) -> bool {
        self.state
            .compare_exchange(ACTIVE, INACTIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for Flag {
    fn default() -> Self {
        Self::new()
    }
}
