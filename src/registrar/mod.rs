//! Interface to the OS service registry
//!
//! The console-mode install and remove directives delegate here. The
//! supervisor core only drives this trait; the Windows implementation in
//! [`windows`] is a thin wrapper over the SCM database.

#[cfg(all(windows, feature = "service"))]
mod windows;

#[cfg(all(windows, feature = "service"))]
pub use windows::WindowsRegistrar;

use std::path::Path;

use crate::error::Result;
use crate::supervisor::ServiceIdentity;

/// Registry-level operations on a named service.
///
/// Mirrors the install/open/start/stop/remove surface of the OS registry.
/// The registry entry is wholly owned by the registrar; the supervisor
/// core keeps no state about it.
pub trait ServiceRegistrar {
    /// Create the registry entry. `executable` is the binary the manager
    /// will launch; the identity's description is applied to the entry.
    fn install(&self, identity: &ServiceIdentity, executable: &Path) -> Result<()>;

    /// Check whether an entry with this name exists
    fn is_installed(&self, name: &str) -> Result<bool>;

    /// Check whether the service is currently running
    fn is_running(&self, name: &str) -> Result<bool>;

    /// Ask the manager to start the installed service
    fn start(&self, name: &str) -> Result<()>;

    /// Ask the manager to stop the running service
    fn stop(&self, name: &str) -> Result<()>;

    /// Delete the registry entry
    fn remove(&self, name: &str) -> Result<()>;
}
