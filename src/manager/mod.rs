//! Abstraction over the host OS service manager
//!
//! The supervisor core never talks to a concrete service API. It drives
//! this trait, which captures the three things every manager provides: a
//! blocking dispatcher that decides whether the process runs managed, a
//! serialized control-handler registration, and a status feedback channel.
//! The Windows implementation lives in [`windows`] behind the `service`
//! feature.

#[cfg(all(windows, feature = "service"))]
mod windows;

#[cfg(all(windows, feature = "service"))]
pub use windows::WindowsServiceManager;

use crate::error::Result;

/// Session identifier as reported by the service manager
pub type SessionId = u32;

/// Reason attached to a session-change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    ConsoleConnect,
    ConsoleDisconnect,
    RemoteConnect,
    RemoteDisconnect,
    Logon,
    Logoff,
    Lock,
    Unlock,
    RemoteControl,
}

/// Payload handed from the control side to the application thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCode {
    /// Synthesized once by the bridge after the startup handshake
    Start,
    /// Stop requested by the manager
    Stop,
    /// The host system is shutting down
    Shutdown,
    /// A session attached to this machine changed state
    SessionChange {
        status: SessionStatus,
        session_id: SessionId,
    },
}

impl ControlCode {
    /// Stop and shutdown both end the application loop
    pub fn is_terminal(self) -> bool {
        matches!(self, ControlCode::Stop | ControlCode::Shutdown)
    }
}

/// Raw control request as delivered by the service manager.
///
/// `Start` never arrives this way; the bridge synthesizes it once the
/// handshake completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Status interrogation, answered without involving the application
    Interrogate,
    /// A control the application must act on
    Control(ControlCode),
    /// Anything this supervisor does not understand
    Unknown(u32),
}

/// Result the control handler returns to the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Handled,
    NotImplemented,
}

/// Service states reported back to the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedState {
    StartPending,
    Running,
    StopPending,
    Stopped,
}

/// How a dispatcher run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The manager accepted the process and ran the service to completion
    ServiceRunCompleted,
    /// The process was not launched by the service manager
    NotUnderManager,
}

/// Entry point the manager invokes on a thread it owns
pub type ServiceMain = Box<dyn FnOnce() + Send>;

/// Control handler invoked on manager-chosen threads.
///
/// The manager serializes invocations; the handler is never re-entered
/// concurrently.
pub type ControlHandler = Box<dyn Fn(ControlRequest) -> HandlerOutcome + Send + Sync>;

/// Status feedback channel to the manager.
///
/// Reporting is best effort; callers log failures and continue.
pub trait StatusReporter: Send + Sync {
    fn report(&self, state: ReportedState) -> Result<()>;
}

/// The host service manager's dispatch surface.
pub trait ServiceManager: Send + Sync {
    /// Hand the calling thread to the manager.
    ///
    /// Blocks for the whole managed run. `service_main` is invoked on a
    /// manager-owned thread only when the process actually runs under the
    /// manager; a console launch resolves to
    /// [`DispatchOutcome::NotUnderManager`] without invoking it.
    fn run_dispatcher(
        &self,
        service_name: &str,
        service_main: ServiceMain,
    ) -> Result<DispatchOutcome>;

    /// Register the control handler for `service_name` and obtain the
    /// status feedback handle.
    fn register_control_handler(
        &self,
        service_name: &str,
        handler: ControlHandler,
    ) -> Result<Box<dyn StatusReporter>>;
}
