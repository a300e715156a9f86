//! Service manager backend over the Windows Service Control Manager

use std::ffi::OsString;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;
use windows_service::service::{
    ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus,
    ServiceType, SessionChangeReason,
};
use windows_service::service_control_handler::{
    self, ServiceControlHandlerResult, ServiceStatusHandle,
};
use windows_service::{define_windows_service, service_dispatcher};

use crate::error::{Result, ServusError};
use crate::manager::{
    ControlCode, ControlHandler, ControlRequest, DispatchOutcome, HandlerOutcome, ReportedState,
    ServiceMain, ServiceManager, SessionStatus, StatusReporter,
};

const SERVICE_TYPE: ServiceType = ServiceType::OWN_PROCESS;

/// Raised by `StartServiceCtrlDispatcher` when the process was started
/// from a console rather than by the SCM
const ERROR_FAILED_SERVICE_CONTROLLER_CONNECT: i32 = 1063;

/// One-shot slot carrying the bridge entry point across the C boundary.
/// `ffi_service_main` has a fixed signature and cannot capture state, so
/// the closure is parked here until the SCM invokes it.
static SERVICE_MAIN_SLOT: Mutex<Option<ServiceMain>> = Mutex::new(None);

define_windows_service!(ffi_service_main, service_main_adapter);

fn service_main_adapter(_arguments: Vec<OsString>) {
    let entry = SERVICE_MAIN_SLOT.lock().take();
    match entry {
        Some(entry) => entry(),
        None => warn!("service main invoked without a registered entry point"),
    }
}

/// [`ServiceManager`] implementation backed by the Windows SCM
pub struct WindowsServiceManager;

impl ServiceManager for WindowsServiceManager {
    fn run_dispatcher(
        &self,
        service_name: &str,
        service_main: ServiceMain,
    ) -> Result<DispatchOutcome> {
        *SERVICE_MAIN_SLOT.lock() = Some(service_main);

        match service_dispatcher::start(service_name, ffi_service_main) {
            Ok(()) => Ok(DispatchOutcome::ServiceRunCompleted),
            Err(err) => {
                // The entry point was never taken; clear the slot so no
                // stale closure survives the failed attempt.
                SERVICE_MAIN_SLOT.lock().take();

                if is_console_launch(&err) {
                    Ok(DispatchOutcome::NotUnderManager)
                } else {
                    Err(ServusError::Registration(err.to_string()))
                }
            }
        }
    }

    fn register_control_handler(
        &self,
        service_name: &str,
        handler: ControlHandler,
    ) -> Result<Box<dyn StatusReporter>> {
        let status_handle = service_control_handler::register(service_name, move |control| {
            dispatch_control(&handler, control)
        })
        .map_err(|e| ServusError::Registration(e.to_string()))?;

        Ok(Box::new(ScmStatusReporter {
            handle: status_handle,
        }))
    }
}

fn is_console_launch(err: &windows_service::Error) -> bool {
    matches!(
        err,
        windows_service::Error::Winapi(io)
            if io.raw_os_error() == Some(ERROR_FAILED_SERVICE_CONTROLLER_CONNECT)
    )
}

/// Translate an SCM control into the supervisor vocabulary and forward it.
/// All synchronization happens behind `handler`; this adapter only maps
/// types at the boundary.
fn dispatch_control(handler: &ControlHandler, control: ServiceControl) -> ServiceControlHandlerResult {
    let request = match control {
        ServiceControl::Interrogate => ControlRequest::Interrogate,
        ServiceControl::Stop => ControlRequest::Control(ControlCode::Stop),
        ServiceControl::Shutdown => ControlRequest::Control(ControlCode::Shutdown),
        ServiceControl::SessionChange(notification) => {
            match session_status(notification.reason) {
                Some(status) => ControlRequest::Control(ControlCode::SessionChange {
                    status,
                    session_id: notification.session_id,
                }),
                // Session notifications outside our vocabulary are
                // acknowledged without reaching the application.
                None => return ServiceControlHandlerResult::NoError,
            }
        }
        _ => return ServiceControlHandlerResult::NotImplemented,
    };

    match handler(request) {
        HandlerOutcome::Handled => ServiceControlHandlerResult::NoError,
        HandlerOutcome::NotImplemented => ServiceControlHandlerResult::NotImplemented,
    }
}

fn session_status(reason: SessionChangeReason) -> Option<SessionStatus> {
    Some(match reason {
        SessionChangeReason::ConsoleConnect => SessionStatus::ConsoleConnect,
        SessionChangeReason::ConsoleDisconnect => SessionStatus::ConsoleDisconnect,
        SessionChangeReason::RemoteConnect => SessionStatus::RemoteConnect,
        SessionChangeReason::RemoteDisconnect => SessionStatus::RemoteDisconnect,
        SessionChangeReason::SessionLogon => SessionStatus::Logon,
        SessionChangeReason::SessionLogoff => SessionStatus::Logoff,
        SessionChangeReason::SessionLock => SessionStatus::Lock,
        SessionChangeReason::SessionUnlock => SessionStatus::Unlock,
        SessionChangeReason::SessionRemoteControl => SessionStatus::RemoteControl,
        _ => return None,
    })
}

struct ScmStatusReporter {
    handle: ServiceStatusHandle,
}

impl StatusReporter for ScmStatusReporter {
    fn report(&self, state: ReportedState) -> Result<()> {
        let (current_state, controls_accepted, wait_hint) = match state {
            ReportedState::StartPending => (
                ServiceState::StartPending,
                ServiceControlAccept::empty(),
                Duration::from_secs(10),
            ),
            ReportedState::Running => (
                ServiceState::Running,
                ServiceControlAccept::STOP
                    | ServiceControlAccept::SHUTDOWN
                    | ServiceControlAccept::SESSION_CHANGE,
                Duration::default(),
            ),
            ReportedState::StopPending => (
                ServiceState::StopPending,
                ServiceControlAccept::empty(),
                Duration::from_secs(5),
            ),
            ReportedState::Stopped => (
                ServiceState::Stopped,
                ServiceControlAccept::empty(),
                Duration::default(),
            ),
        };

        self.handle
            .set_service_status(ServiceStatus {
                service_type: SERVICE_TYPE,
                current_state,
                controls_accepted,
                exit_code: ServiceExitCode::Win32(0),
                checkpoint: 0,
                wait_hint,
                process_id: None,
            })
            .map_err(|e| ServusError::StatusReport(e.to_string()))
    }
}
