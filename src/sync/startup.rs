//! Startup rendezvous between the control bridge and the application thread

use parking_lot::{Condvar, Mutex};

/// Lifecycle state of the supervisor.
///
/// Exactly one of `ErrorOccurred`, `RunningAsConsole`, or
/// `ServiceMainInvoked` is reached from `NotStarted`, exactly once.
/// `ApplicationReady` and `RunningAsService` follow only on the service
/// path. No state is ever revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Initial state, before the dispatcher attempt resolves
    NotStarted,
    /// The dispatcher failed for a reason other than a console launch
    ErrorOccurred,
    /// The process was launched from a console, not by the manager
    RunningAsConsole,
    /// The manager invoked the service entry point
    ServiceMainInvoked,
    /// The application execution context exists
    ApplicationReady,
    /// Control handler registered, service startup finishing
    RunningAsService,
}

impl RunState {
    fn can_become(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (NotStarted, ErrorOccurred)
                | (NotStarted, RunningAsConsole)
                | (NotStarted, ServiceMainInvoked)
                | (ServiceMainInvoked, ApplicationReady)
                | (ApplicationReady, RunningAsService)
        )
    }
}

/// One-shot rendezvous point for the startup handshake.
///
/// The state is mutated only under the internal lock, by exactly two
/// writers over the process lifetime: the control bridge thread and the
/// application thread.
pub struct StartupCoordinator {
    state: Mutex<RunState>,
    signal: Condvar,
}

impl StartupCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::NotStarted),
            signal: Condvar::new(),
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Move to `next` and wake every waiter.
    ///
    /// Transitions must follow the state machine above; an illegal edge is
    /// a caller bug and is rejected in debug builds.
    pub fn transition(&self, next: RunState) {
        let mut state = self.state.lock();
        debug_assert!(
            state.can_become(next),
            "illegal startup transition {:?} -> {:?}",
            *state,
            next
        );
        *state = next;
        self.signal.notify_all();
    }

    /// Block until the state satisfies `predicate`.
    ///
    /// The predicate is re-checked under the lock after every wake, so
    /// spurious wakeups and already-satisfied states are both handled.
    /// Returns the state that satisfied the predicate.
    pub fn await_state<P>(&self, predicate: P) -> RunState
    where
        P: Fn(RunState) -> bool,
    {
        let mut state = self.state.lock();
        while !predicate(*state) {
            self.signal.wait(&mut state);
        }
        *state
    }
}

impl Default for StartupCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
