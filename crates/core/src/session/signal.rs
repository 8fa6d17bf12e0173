use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct SignalState {
    set: bool,
    cancelled: bool,
}

/// Manual-reset signal with cancellation.
///
/// [`wait_timeout`](Self::wait_timeout) returns `true` only when the signal
/// is set before the timeout expires and before [`cancel`](Self::cancel).
#[derive(Debug, Default)]
pub struct Signal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.state.lock().set = true;
        self.cond.notify_all();
    }

    /// Clear both the set and cancelled flags.
    pub fn reset(&self) {
        *self.state.lock() = SignalState::default();
    }

    /// Wake every waiter with `false`.
    pub fn cancel(&self) {
        self.state.lock().cancelled = true;
        self.cond.notify_all();
    }

    pub fn is_set(&self) -> bool {
        self.state.lock().set
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.cancelled {
                return false;
            }
            if state.set {
                return true;
            }
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return state.set && !state.cancelled;
            }
        }
    }
}
