use std::sync::atomic::{AtomicBool, Ordering};

/// A single-use latch that lets exactly one terminal action through.
///
/// Every exit of an upload request, an error response or the hand-off to the next
/// stage, goes through [`try_fire`](ResponseGuard::try_fire). The first call runs its
/// action and closes the latch; every later call is a no-op.
#[derive(Debug, Default)]
pub struct ResponseGuard {
    fired: AtomicBool,
}

impl ResponseGuard {
    /// Creates an open latch.
    pub fn new() -> ResponseGuard {
        ResponseGuard::default()
    }

    /// Runs `action` if no terminal action has been taken yet, returning whether it ran.
    pub fn try_fire<F: FnOnce()>(&self, action: F) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        action();
        true
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
