//! servus - dual-mode background-service supervisor
//!
//! Runs one executable either as an interactive console program or as an
//! OS-managed background service, depending on how it was launched,
//! without the hosted application knowing which mode is active. The
//! application implements [`ServiceApp`]; a thin `main` builds a
//! [`Supervisor`] with the platform's service manager and registrar and
//! calls [`Supervisor::run`] with the process arguments.

pub mod app;
pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod registrar;
pub mod router;
pub mod supervisor;
pub mod sync;

pub use app::ServiceApp;
pub use error::{Result, ServusError};
pub use supervisor::{ServiceIdentity, Supervisor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
