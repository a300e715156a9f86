//! Flag-plus-signal gate pairing one event deliverer with one consumer

use parking_lot::{Condvar, Mutex};

/// Blocks an event deliverer until the consumer finishes processing.
///
/// One cycle: the deliverer calls [`deliver`](EventGate::deliver), which
/// clears the processed flag, hands the event off, and parks until the
/// consumer calls [`complete`](EventGate::complete). At most one event may
/// be in flight per gate. Callers must not start a new cycle before the
/// previous one finished; the service manager serializes control delivery,
/// which provides this ordering for free.
pub struct EventGate {
    processed: Mutex<bool>,
    signal: Condvar,
}

impl EventGate {
    pub fn new() -> Self {
        Self {
            processed: Mutex::new(true),
            signal: Condvar::new(),
        }
    }

    /// Run one delivery cycle.
    ///
    /// `post` runs with the gate held and must hand the event to the
    /// consumer without blocking (a channel send). Returns once the
    /// consumer has called [`complete`](EventGate::complete). The flag is
    /// re-checked after every wake, so spurious wakeups cannot end the
    /// cycle early.
    pub fn deliver<F: FnOnce()>(&self, post: F) {
        let mut processed = self.processed.lock();
        *processed = false;
        post();
        while !*processed {
            self.signal.wait(&mut processed);
        }
    }

    /// Mark the in-flight event processed and wake the deliverer.
    pub fn complete(&self) {
        let mut processed = self.processed.lock();
        *processed = true;
        self.signal.notify_all();
    }

    /// Check whether the last delivered event has been processed
    pub fn is_processed(&self) -> bool {
        *self.processed.lock()
    }
}

impl Default for EventGate {
    fn default() -> Self {
        Self::new()
    }
}
