//! Completion signal for cross-context capture requests.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Status of a completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStatus {
    /// The work has not completed yet.
    Unsignaled,
    /// The work has completed.
    Signaled,
}

/// One-shot, re-armable completion signal.
///
/// The render context signals it once a batch is finalized; the calling
/// thread blocks on it in bounded slices.
///
/// # Example
///
/// ```ignore
/// let signal = Arc::new(CompletionSignal::new());
/// let remote = signal.clone();
/// render.enqueue(Box::new(move || {
///     // ... finalize ...
///     remote.signal();
/// }))?;
///
/// while !signal.wait_for(Duration::from_secs(5)) {
///     log::warn!("still waiting");
/// }
/// ```
#[derive(Debug)]
pub struct CompletionSignal {
    status: Mutex<SignalStatus>,
    cond: Condvar,
}

impl CompletionSignal {
    /// Create a new signal in the unsignaled state.
    pub fn new() -> Self {
        Self {
            status: Mutex::new(SignalStatus::Unsignaled),
            cond: Condvar::new(),
        }
    }

    /// Check the current status of the signal.
    pub fn status(&self) -> SignalStatus {
        *self.status.lock()
    }

    /// Check if the signal is set (non-blocking).
    pub fn is_signaled(&self) -> bool {
        self.status() == SignalStatus::Signaled
    }

    /// Set the signal and wake every waiter.
    pub fn signal(&self) {
        let mut status = self.status.lock();
        *status = SignalStatus::Signaled;
        self.cond.notify_all();
    }

    /// Wait for the signal with a timeout.
    ///
    /// Returns `true` if the signal was set, `false` if the timeout elapsed.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut status = self.status.lock();
        while *status == SignalStatus::Unsignaled {
            if self.cond.wait_until(&mut status, deadline).timed_out() {
                return *status == SignalStatus::Signaled;
            }
        }
        true
    }

    /// Wait for the signal without a timeout.
    pub fn wait(&self) {
        let mut status = self.status.lock();
        while *status == SignalStatus::Unsignaled {
            self.cond.wait(&mut status);
        }
    }

    /// Re-arm the signal.
    ///
    /// Must only be called when no one is about to signal the previous round.
    pub fn reset(&self) {
        *self.status.lock() = SignalStatus::Unsignaled;
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}
