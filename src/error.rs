//! Unified error types for servus

use thiserror::Error;

/// Main error type for supervisor operations
#[derive(Error, Debug)]
pub enum ServusError {
    /// The service manager refused or aborted dispatcher registration
    #[error("service manager registration failed: {0}")]
    Registration(String),

    /// Reporting service status to the manager failed
    #[error("status report to the service manager failed: {0}")]
    StatusReport(String),

    /// A service registry operation failed
    #[error("registrar {operation} failed: {message}")]
    Registrar { operation: String, message: String },
}

/// Result type alias for supervisor operations
pub type Result<T> = std::result::Result<T, ServusError>;

impl ServusError {
    /// Create a registrar error with the failed operation name
    pub fn registrar(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Registrar {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Check if this error must abort supervisor startup
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServusError::Registration(_))
    }
}
