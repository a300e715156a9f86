//! Control-side bridge between the service manager and the application loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::manager::{
    ControlCode, ControlRequest, DispatchOutcome, HandlerOutcome, ReportedState, ServiceMain,
    ServiceManager, StatusReporter,
};
use crate::router::EventPoster;
use crate::sync::{EventGate, RunState, StartupCoordinator};

/// State shared between the bridge thread, the manager's callback threads,
/// and the supervisor.
struct BridgeShared {
    manager: Arc<dyn ServiceManager>,
    startup: Arc<StartupCoordinator>,
    gate: Arc<EventGate>,
    poster: EventPoster,
    service_name: String,
    /// Written once by the service entry point, read by the control
    /// callback and by supervisor teardown
    status: Mutex<Option<Box<dyn StatusReporter>>>,
    /// Latched after a terminal control code has been fully processed
    stopping: AtomicBool,
}

impl BridgeShared {
    /// Best-effort status report; failures are logged and swallowed.
    fn report(&self, state: ReportedState) {
        if let Some(reporter) = self.status.lock().as_ref() {
            if let Err(err) = reporter.report(state) {
                warn!("failed to report service state {:?}: {}", state, err);
            }
        }
    }
}

/// Thread that hands this process to the service manager's dispatcher.
///
/// The thread parks inside the manager's dispatch call for the whole
/// managed run; on a console launch it resolves the startup state and
/// exits immediately.
pub struct ControlBridge {
    shared: Arc<BridgeShared>,
    handle: Option<JoinHandle<()>>,
}

impl ControlBridge {
    pub fn spawn(
        manager: Arc<dyn ServiceManager>,
        startup: Arc<StartupCoordinator>,
        gate: Arc<EventGate>,
        poster: EventPoster,
        service_name: String,
    ) -> Self {
        let shared = Arc::new(BridgeShared {
            manager,
            startup,
            gate,
            poster,
            service_name,
            status: Mutex::new(None),
            stopping: AtomicBool::new(false),
        });

        let thread_shared = shared.clone();
        let handle = thread::spawn(move || dispatch_loop(thread_shared));

        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Report a service state through the handle registered during the
    /// service entry point. No-op before registration and in console mode.
    pub fn report(&self, state: ReportedState) {
        self.shared.report(state);
    }

    /// Wait for the bridge thread to finish
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("control bridge thread panicked");
            }
        }
    }
}

/// Body of the bridge thread
fn dispatch_loop(shared: Arc<BridgeShared>) {
    let entry_shared = shared.clone();
    let entry: ServiceMain = Box::new(move || service_main(entry_shared));

    let name = shared.service_name.clone();
    match shared.manager.run_dispatcher(&name, entry) {
        Ok(DispatchOutcome::ServiceRunCompleted) => {
            // State transitions were driven by the service entry point.
            debug!("service dispatcher finished");
        }
        Ok(DispatchOutcome::NotUnderManager) => {
            shared.startup.transition(RunState::RunningAsConsole);
        }
        Err(err) => {
            warn!("service dispatcher failed: {}", err);
            shared.startup.transition(RunState::ErrorOccurred);
        }
    }
}

/// Service entry point, invoked on a manager-provided thread once the
/// manager accepts the process.
fn service_main(shared: Arc<BridgeShared>) {
    shared.startup.transition(RunState::ServiceMainInvoked);

    // The application context is built on the supervisor thread; controls
    // must not flow before it exists.
    shared
        .startup
        .await_state(|state| state == RunState::ApplicationReady);
    shared.startup.transition(RunState::RunningAsService);

    let callback = ControlCallback {
        shared: shared.clone(),
    };
    let handler = Box::new(move |request| callback.handle(request));

    let reporter = match shared
        .manager
        .register_control_handler(&shared.service_name, handler)
    {
        Ok(reporter) => reporter,
        Err(err) => {
            warn!("control handler registration failed: {}", err);
            return;
        }
    };
    *shared.status.lock() = Some(reporter);

    shared.report(ReportedState::StartPending);

    // The start notification runs through the same gate as every control
    // the manager will deliver later.
    let synthesized = ControlCallback {
        shared: shared.clone(),
    };
    synthesized.handle(ControlRequest::Control(ControlCode::Start));

    shared.report(ReportedState::Running);
    info!("running as service '{}'", shared.service_name);
}

/// Converts one manager control request into an application event,
/// blocking the manager's thread until the application finished with it.
///
/// Never re-entered concurrently for the same gate; the manager's
/// serialization of control delivery is a precondition.
struct ControlCallback {
    shared: Arc<BridgeShared>,
}

impl ControlCallback {
    fn handle(&self, request: ControlRequest) -> HandlerOutcome {
        match request {
            ControlRequest::Interrogate => HandlerOutcome::Handled,
            ControlRequest::Unknown(code) => {
                debug!("ignoring unrecognized control code {}", code);
                HandlerOutcome::NotImplemented
            }
            ControlRequest::Control(code) => self.handle_control(code),
        }
    }

    fn handle_control(&self, code: ControlCode) -> HandlerOutcome {
        // Once a terminal code has been processed the loop is gone;
        // acknowledge anything that still trickles in without dispatching.
        if self.shared.stopping.load(Ordering::Acquire) {
            debug!("dropping control {:?} delivered after stop", code);
            return HandlerOutcome::Handled;
        }

        if code == ControlCode::Stop {
            self.shared.report(ReportedState::StopPending);
        }

        self.shared.gate.deliver(|| self.shared.poster.post(code));

        if code.is_terminal() {
            self.shared.stopping.store(true, Ordering::Release);
        }

        HandlerOutcome::Handled
    }
}
