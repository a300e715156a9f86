//! Callbacks implemented by the hosted application

use crate::manager::{SessionId, SessionStatus};

/// What the supervisor calls into once the process lifecycle is settled.
///
/// All callbacks run on the application thread, one at a time, in delivery
/// order. The control side blocks until each callback returns, so a
/// callback that never returns stalls control delivery for the whole
/// process.
pub trait ServiceApp {
    /// The service has been brought up; start doing work.
    fn on_start(&mut self);

    /// A stop or shutdown was requested.
    ///
    /// Called at most once, even if the manager delivers several terminal
    /// controls. Must be safe to call when `on_start` did not get the
    /// application fully running.
    fn on_stop(&mut self);

    /// A session attached to this machine changed state.
    fn on_session_change(&mut self, status: SessionStatus, session_id: SessionId) {
        let _ = (status, session_id);
    }
}
