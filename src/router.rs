//! Event delivery on the application thread

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::app::ServiceApp;
use crate::manager::ControlCode;
use crate::sync::EventGate;

/// Cross-thread handle posting control codes into the application loop.
///
/// Posting never blocks. Codes are consumed in submission order, each
/// exactly once.
#[derive(Clone)]
pub struct EventPoster {
    tx: Sender<ControlCode>,
}

impl EventPoster {
    pub fn post(&self, code: ControlCode) {
        if self.tx.send(code).is_err() {
            // Only reachable during teardown, after the control side has
            // stopped opening gate cycles.
            debug!("control code {:?} posted after the loop ended", code);
        }
    }
}

/// Consumes posted control codes on the application thread.
///
/// Dispatches each code to the application callbacks, then completes the
/// shared gate so the control side may return to the manager. Reactions
/// themselves never block on the control side.
pub struct EventRouter {
    rx: Receiver<ControlCode>,
    gate: Arc<EventGate>,
    stop_delivered: bool,
}

impl EventRouter {
    /// Build the router and its posting handle.
    ///
    /// The channel exists from this point on, so the control side can hold
    /// a poster before the loop starts consuming.
    pub fn new(gate: Arc<EventGate>) -> (Self, EventPoster) {
        let (tx, rx) = unbounded();
        (
            Self {
                rx,
                gate,
                stop_delivered: false,
            },
            EventPoster { tx },
        )
    }

    /// Run the application loop until a terminal control code has been
    /// processed. Returns the loop's exit code.
    pub fn run(mut self, app: &mut dyn ServiceApp) -> i32 {
        loop {
            let code = match self.rx.recv() {
                Ok(code) => code,
                Err(_) => {
                    debug!("event channel closed, leaving the application loop");
                    break;
                }
            };

            let terminate = self.dispatch(code, app);

            // The gate resolves after the callback returned, whatever the
            // callback did.
            self.gate.complete();

            if terminate {
                break;
            }
        }

        0
    }

    fn dispatch(&mut self, code: ControlCode, app: &mut dyn ServiceApp) -> bool {
        match code {
            ControlCode::Start => {
                app.on_start();
                false
            }
            ControlCode::Stop | ControlCode::Shutdown => {
                if !self.stop_delivered {
                    self.stop_delivered = true;
                    app.on_stop();
                }
                true
            }
            ControlCode::SessionChange { status, session_id } => {
                app.on_session_change(status, session_id);
                false
            }
        }
    }
}
