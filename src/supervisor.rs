//! Supervisor orchestration: thread startup, mode selection, teardown

use std::ffi::OsString;
use std::sync::Arc;

use clap::Parser as _;
use tracing::{debug, info};

use crate::app::ServiceApp;
use crate::bridge::ControlBridge;
use crate::config::{ConsoleArgs, Settings};
use crate::logging;
use crate::manager::{ReportedState, ServiceManager};
use crate::registrar::ServiceRegistrar;
use crate::router::{EventPoster, EventRouter};
use crate::sync::{EventGate, RunState, StartupCoordinator};

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;

/// Immutable identity under which the process registers with the OS
#[derive(Debug, Clone)]
pub struct ServiceIdentity {
    /// Registry name, also used for dispatcher registration
    pub name: String,
    /// Human-readable name shown by service management tools
    pub display_name: String,
    /// Description applied to the registry entry on install
    pub description: String,
}

impl ServiceIdentity {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
        }
    }
}

/// Owns the control bridge thread and the application loop, and decides
/// whether this process run is a console invocation or a managed service.
///
/// The hosted application is borrowed for the duration of [`run`]
/// (Supervisor calls into it but does not control its lifetime).
pub struct Supervisor {
    identity: ServiceIdentity,
    manager: Arc<dyn ServiceManager>,
    registrar: Box<dyn ServiceRegistrar>,
    startup: Arc<StartupCoordinator>,
    gate: Arc<EventGate>,
    poster: EventPoster,
    router: EventRouter,
}

impl Supervisor {
    pub fn new(
        identity: ServiceIdentity,
        manager: Arc<dyn ServiceManager>,
        registrar: Box<dyn ServiceRegistrar>,
    ) -> Self {
        let startup = Arc::new(StartupCoordinator::new());
        let gate = Arc::new(EventGate::new());

        // The posting channel exists from construction, so the control
        // side holds a live poster before the loop runs.
        let (router, poster) = EventRouter::new(gate.clone());

        Self {
            identity,
            manager,
            registrar,
            startup,
            gate,
            poster,
            router,
        }
    }

    /// Run the process to completion and produce its exit code.
    ///
    /// `args` is only consulted on the console path, for the install and
    /// remove directives.
    pub fn run<I, T>(self, app: &mut dyn ServiceApp, args: I) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let bridge = ControlBridge::spawn(
            self.manager.clone(),
            self.startup.clone(),
            self.gate.clone(),
            self.poster.clone(),
            self.identity.name.clone(),
        );

        let state = self.startup.await_state(|s| s != RunState::NotStarted);

        match state {
            RunState::ErrorOccurred => {
                bridge.join();
                EXIT_FAILURE
            }
            RunState::RunningAsConsole => {
                let exit_code = self.run_console(args);
                bridge.join();
                exit_code
            }
            RunState::ServiceMainInvoked => {
                let settings =
                    Settings::load_default(&self.identity.name).unwrap_or_else(|err| {
                        eprintln!("Warning: failed to load settings: {}, using defaults", err);
                        Settings::default()
                    });
                logging::init_service(&settings);

                info!("starting service '{}'", self.identity.name);

                // The loop exists; let the service entry point continue.
                self.startup.transition(RunState::ApplicationReady);

                let exit_code = self.router.run(app);

                bridge.report(ReportedState::Stopped);
                bridge.join();
                exit_code
            }
            state => {
                debug_assert!(false, "unexpected startup state {:?}", state);
                bridge.join();
                EXIT_FAILURE
            }
        }
    }

    /// Console-mode path: act on install/remove directives, touch nothing
    /// else.
    fn run_console<I, T>(&self, args: I) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let parsed = match ConsoleArgs::try_parse_from(args) {
            Ok(parsed) => parsed,
            Err(err) => {
                // clap routes --help and --version through the error path
                let failed = err.use_stderr();
                let _ = err.print();
                return if failed { EXIT_FAILURE } else { EXIT_OK };
            }
        };

        if parsed.install {
            self.console_install()
        } else if parsed.remove {
            self.console_remove()
        } else {
            debug!("console launch with no service directive");
            EXIT_OK
        }
    }

    fn console_install(&self) -> i32 {
        let executable = match std::env::current_exe() {
            Ok(path) => path,
            Err(err) => {
                println!("Error: could not determine the executable path: {}", err);
                return EXIT_FAILURE;
            }
        };

        if let Err(err) = self.registrar.install(&self.identity, &executable) {
            println!("Error: service could not be installed: {}", err);
            return EXIT_FAILURE;
        }

        println!("Service has been successfully installed. Starting...");

        if let Err(err) = self.registrar.start(&self.identity.name) {
            println!("Error: service could not be started: {}", err);
            return EXIT_FAILURE;
        }

        println!("Done.");
        EXIT_OK
    }

    fn console_remove(&self) -> i32 {
        match self.registrar.is_installed(&self.identity.name) {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                println!("Could not access the service.");
                println!(
                    "The service is not installed or you do not have administrator rights."
                );
                return EXIT_FAILURE;
            }
        }

        if self.registrar.is_running(&self.identity.name).unwrap_or(false) {
            println!("Service is started. Stopping...");
            if let Err(err) = self.registrar.stop(&self.identity.name) {
                println!("Error: service could not be stopped: {}", err);
                return EXIT_FAILURE;
            }
            println!("Done.");
        }

        println!("Removing the service...");
        if let Err(err) = self.registrar.remove(&self.identity.name) {
            println!("Error: service could not be removed: {}", err);
            return EXIT_FAILURE;
        }

        println!("Done.");
        EXIT_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, ServusError};
    use crate::manager::{
        ControlCode, ControlHandler, ControlRequest, DispatchOutcome, HandlerOutcome,
        ServiceMain, SessionStatus, StatusReporter,
    };
    use crossbeam_channel::{unbounded, Receiver, Sender};
    use parking_lot::Mutex;
    use std::path::Path;
    use std::thread;

    struct RecordingApp {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ServiceApp for RecordingApp {
        fn on_start(&mut self) {
            self.calls.lock().push("start".into());
        }

        fn on_stop(&mut self) {
            self.calls.lock().push("stop".into());
        }

        fn on_session_change(&mut self, status: SessionStatus, session_id: u32) {
            self.calls
                .lock()
                .push(format!("session:{:?}:{}", status, session_id));
        }
    }

    #[derive(Clone, Copy)]
    enum DispatchMode {
        Managed,
        Console,
        Broken,
    }

    struct MockInner {
        handler: Mutex<Option<ControlHandler>>,
        statuses: Mutex<Vec<ReportedState>>,
        registered_tx: Sender<()>,
        status_tx: Sender<ReportedState>,
        stopped_tx: Sender<()>,
    }

    /// In-process service manager: runs the service entry point on its own
    /// thread and lets the test inject serialized control requests.
    struct MockManager {
        inner: Arc<MockInner>,
        stopped_rx: Receiver<()>,
        mode: DispatchMode,
    }

    struct MockReporter {
        inner: Arc<MockInner>,
    }

    impl StatusReporter for MockReporter {
        fn report(&self, state: ReportedState) -> Result<()> {
            self.inner.statuses.lock().push(state);
            let _ = self.inner.status_tx.send(state);
            if state == ReportedState::Stopped {
                let _ = self.inner.stopped_tx.send(());
            }
            Ok(())
        }
    }

    impl ServiceManager for MockManager {
        fn run_dispatcher(
            &self,
            _service_name: &str,
            service_main: ServiceMain,
        ) -> Result<DispatchOutcome> {
            match self.mode {
                DispatchMode::Console => Ok(DispatchOutcome::NotUnderManager),
                DispatchMode::Broken => {
                    Err(ServusError::Registration("dispatcher unavailable".into()))
                }
                DispatchMode::Managed => {
                    let entry = thread::spawn(move || service_main());
                    // The real dispatcher returns once the service has
                    // reported itself stopped.
                    let _ = self.stopped_rx.recv();
                    let _ = entry.join();
                    Ok(DispatchOutcome::ServiceRunCompleted)
                }
            }
        }

        fn register_control_handler(
            &self,
            _service_name: &str,
            handler: ControlHandler,
        ) -> Result<Box<dyn StatusReporter>> {
            *self.inner.handler.lock() = Some(handler);
            let _ = self.inner.registered_tx.send(());
            Ok(Box::new(MockReporter {
                inner: self.inner.clone(),
            }))
        }
    }

    fn mock_manager(
        mode: DispatchMode,
    ) -> (MockManager, Arc<MockInner>, Receiver<()>, Receiver<ReportedState>) {
        let (registered_tx, registered_rx) = unbounded();
        let (status_tx, status_rx) = unbounded();
        let (stopped_tx, stopped_rx) = unbounded();

        let inner = Arc::new(MockInner {
            handler: Mutex::new(None),
            statuses: Mutex::new(Vec::new()),
            registered_tx,
            status_tx,
            stopped_tx,
        });

        let manager = MockManager {
            inner: inner.clone(),
            stopped_rx,
            mode,
        };

        (manager, inner, registered_rx, status_rx)
    }

    fn deliver(inner: &Arc<MockInner>, request: ControlRequest) -> HandlerOutcome {
        let guard = inner.handler.lock();
        let handler = guard.as_ref().expect("control handler registered");
        handler(request)
    }

    #[derive(Clone, Default)]
    struct MockRegistrar {
        ops: Arc<Mutex<Vec<String>>>,
        installed: bool,
        running: bool,
        fail_install: bool,
    }

    impl ServiceRegistrar for MockRegistrar {
        fn install(&self, _identity: &ServiceIdentity, _executable: &Path) -> Result<()> {
            self.ops.lock().push("install".into());
            if self.fail_install {
                Err(ServusError::registrar("install", "access denied"))
            } else {
                Ok(())
            }
        }

        fn is_installed(&self, _name: &str) -> Result<bool> {
            self.ops.lock().push("is_installed".into());
            Ok(self.installed)
        }

        fn is_running(&self, _name: &str) -> Result<bool> {
            self.ops.lock().push("is_running".into());
            Ok(self.running)
        }

        fn start(&self, _name: &str) -> Result<()> {
            self.ops.lock().push("start".into());
            Ok(())
        }

        fn stop(&self, _name: &str) -> Result<()> {
            self.ops.lock().push("stop".into());
            Ok(())
        }

        fn remove(&self, _name: &str) -> Result<()> {
            self.ops.lock().push("remove".into());
            Ok(())
        }
    }

    fn identity() -> ServiceIdentity {
        ServiceIdentity::new("servus-test", "Servus Test Service", "Exercises the supervisor")
    }

    fn recording_app() -> (RecordingApp, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            RecordingApp {
                calls: calls.clone(),
            },
            calls,
        )
    }

    #[test]
    fn console_launch_without_directives_is_a_no_op() {
        let (manager, _inner, _registered_rx, _status_rx) = mock_manager(DispatchMode::Console);
        let registrar = MockRegistrar::default();
        let ops = registrar.ops.clone();
        let supervisor = Supervisor::new(identity(), Arc::new(manager), Box::new(registrar));

        let (mut app, calls) = recording_app();
        let exit_code = supervisor.run(&mut app, ["servus"]);

        assert_eq!(exit_code, 0);
        assert!(calls.lock().is_empty());
        assert!(ops.lock().is_empty());
    }

    #[test]
    fn broken_dispatcher_is_fatal_before_any_application_work() {
        let (manager, inner, _registered_rx, _status_rx) = mock_manager(DispatchMode::Broken);
        let supervisor = Supervisor::new(
            identity(),
            Arc::new(manager),
            Box::new(MockRegistrar::default()),
        );

        let (mut app, calls) = recording_app();
        let exit_code = supervisor.run(&mut app, ["servus"]);

        assert_eq!(exit_code, 1);
        assert!(calls.lock().is_empty());
        assert!(inner.statuses.lock().is_empty());
    }

    #[test]
    fn managed_run_delivers_start_session_stop_in_order() {
        let (manager, inner, registered_rx, status_rx) = mock_manager(DispatchMode::Managed);
        let supervisor = Supervisor::new(
            identity(),
            Arc::new(manager),
            Box::new(MockRegistrar::default()),
        );

        let (mut app, calls) = recording_app();

        let driver = {
            let inner = inner.clone();
            let calls = calls.clone();
            thread::spawn(move || {
                registered_rx.recv().unwrap();
                // Controls are accepted only once the service reports
                // itself running.
                while status_rx.recv().unwrap() != ReportedState::Running {}
                assert_eq!(calls.lock().len(), 1);

                let outcome = deliver(
                    &inner,
                    ControlRequest::Control(ControlCode::SessionChange {
                        status: SessionStatus::Lock,
                        session_id: 7,
                    }),
                );
                assert_eq!(outcome, HandlerOutcome::Handled);
                // Each gate resolves before the handler returns.
                assert_eq!(calls.lock().len(), 2);

                assert_eq!(
                    deliver(&inner, ControlRequest::Control(ControlCode::Stop)),
                    HandlerOutcome::Handled
                );
                assert_eq!(calls.lock().len(), 3);
            })
        };

        let exit_code = supervisor.run(&mut app, ["servus"]);
        driver.join().unwrap();

        assert_eq!(exit_code, 0);
        assert_eq!(
            *calls.lock(),
            vec![
                "start".to_string(),
                "session:Lock:7".to_string(),
                "stop".to_string()
            ]
        );
        assert_eq!(
            *inner.statuses.lock(),
            vec![
                ReportedState::StartPending,
                ReportedState::Running,
                ReportedState::StopPending,
                ReportedState::Stopped
            ]
        );
    }

    #[test]
    fn late_controls_after_stop_never_reach_the_application() {
        let (manager, inner, registered_rx, status_rx) = mock_manager(DispatchMode::Managed);
        let supervisor = Supervisor::new(
            identity(),
            Arc::new(manager),
            Box::new(MockRegistrar::default()),
        );

        let (mut app, calls) = recording_app();

        let driver = {
            let inner = inner.clone();
            thread::spawn(move || {
                registered_rx.recv().unwrap();
                while status_rx.recv().unwrap() != ReportedState::Running {}

                assert_eq!(
                    deliver(&inner, ControlRequest::Control(ControlCode::Shutdown)),
                    HandlerOutcome::Handled
                );

                // A second terminal code and a stale session change are
                // acknowledged without dispatching.
                assert_eq!(
                    deliver(&inner, ControlRequest::Control(ControlCode::Stop)),
                    HandlerOutcome::Handled
                );
                assert_eq!(
                    deliver(
                        &inner,
                        ControlRequest::Control(ControlCode::SessionChange {
                            status: SessionStatus::Logoff,
                            session_id: 1,
                        })
                    ),
                    HandlerOutcome::Handled
                );
                assert_eq!(
                    deliver(&inner, ControlRequest::Interrogate),
                    HandlerOutcome::Handled
                );
                assert_eq!(
                    deliver(&inner, ControlRequest::Unknown(0x80)),
                    HandlerOutcome::NotImplemented
                );
            })
        };

        let exit_code = supervisor.run(&mut app, ["servus"]);
        driver.join().unwrap();

        assert_eq!(exit_code, 0);
        assert_eq!(
            *calls.lock(),
            vec!["start".to_string(), "stop".to_string()]
        );
        // Shutdown skips the stop-pending report.
        assert_eq!(
            *inner.statuses.lock(),
            vec![
                ReportedState::StartPending,
                ReportedState::Running,
                ReportedState::Stopped
            ]
        );
    }

    #[test]
    fn console_install_runs_registrar_and_starts_the_service() {
        let (manager, _inner, _registered_rx, _status_rx) = mock_manager(DispatchMode::Console);
        let registrar = MockRegistrar::default();
        let ops = registrar.ops.clone();
        let supervisor = Supervisor::new(identity(), Arc::new(manager), Box::new(registrar));

        let (mut app, _calls) = recording_app();
        let exit_code = supervisor.run(&mut app, ["servus", "--install"]);

        assert_eq!(exit_code, 0);
        assert_eq!(*ops.lock(), vec!["install".to_string(), "start".to_string()]);
    }

    #[test]
    fn failed_install_returns_a_nonzero_exit_code() {
        let (manager, _inner, _registered_rx, _status_rx) = mock_manager(DispatchMode::Console);
        let registrar = MockRegistrar {
            fail_install: true,
            ..MockRegistrar::default()
        };
        let ops = registrar.ops.clone();
        let supervisor = Supervisor::new(identity(), Arc::new(manager), Box::new(registrar));

        let (mut app, _calls) = recording_app();
        let exit_code = supervisor.run(&mut app, ["servus", "--install"]);

        assert_eq!(exit_code, 1);
        assert_eq!(*ops.lock(), vec!["install".to_string()]);
    }

    #[test]
    fn console_remove_stops_a_running_service_first() {
        let (manager, _inner, _registered_rx, _status_rx) = mock_manager(DispatchMode::Console);
        let registrar = MockRegistrar {
            installed: true,
            running: true,
            ..MockRegistrar::default()
        };
        let ops = registrar.ops.clone();
        let supervisor = Supervisor::new(identity(), Arc::new(manager), Box::new(registrar));

        let (mut app, _calls) = recording_app();
        let exit_code = supervisor.run(&mut app, ["servus", "--remove"]);

        assert_eq!(exit_code, 0);
        assert_eq!(
            *ops.lock(),
            vec![
                "is_installed".to_string(),
                "is_running".to_string(),
                "stop".to_string(),
                "remove".to_string()
            ]
        );
    }

    #[test]
    fn console_remove_of_a_missing_service_fails() {
        let (manager, _inner, _registered_rx, _status_rx) = mock_manager(DispatchMode::Console);
        let registrar = MockRegistrar::default();
        let ops = registrar.ops.clone();
        let supervisor = Supervisor::new(identity(), Arc::new(manager), Box::new(registrar));

        let (mut app, _calls) = recording_app();
        let exit_code = supervisor.run(&mut app, ["servus", "--remove"]);

        assert_eq!(exit_code, 1);
        assert_eq!(*ops.lock(), vec!["is_installed".to_string()]);
    }
}
