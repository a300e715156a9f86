//! Service registrar backend over the Windows SCM database

use std::ffi::OsStr;
use std::path::Path;

use windows_service::service::{
    Service, ServiceAccess, ServiceErrorControl, ServiceInfo, ServiceStartType, ServiceState,
    ServiceType,
};
use windows_service::service_manager::{
    ServiceManager as ScmConnection, ServiceManagerAccess,
};

use crate::error::{Result, ServusError};
use crate::registrar::ServiceRegistrar;
use crate::supervisor::ServiceIdentity;

/// Talks to the local SCM database
pub struct WindowsRegistrar;

impl WindowsRegistrar {
    fn connect(&self, access: ServiceManagerAccess) -> Result<ScmConnection> {
        ScmConnection::local_computer(None::<&str>, access)
            .map_err(|e| ServusError::registrar("connect", e.to_string()))
    }

    fn open(&self, name: &str, access: ServiceAccess) -> Result<Service> {
        let scm = self.connect(ServiceManagerAccess::CONNECT)?;
        scm.open_service(name, access)
            .map_err(|e| ServusError::registrar("open", e.to_string()))
    }
}

impl ServiceRegistrar for WindowsRegistrar {
    fn install(&self, identity: &ServiceIdentity, executable: &Path) -> Result<()> {
        let scm =
            self.connect(ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE)?;

        let info = ServiceInfo {
            name: identity.name.clone().into(),
            display_name: identity.display_name.clone().into(),
            service_type: ServiceType::OWN_PROCESS,
            start_type: ServiceStartType::AutoStart,
            error_control: ServiceErrorControl::Normal,
            executable_path: executable.to_path_buf(),
            launch_arguments: vec![],
            dependencies: vec![],
            account_name: None,
            account_password: None,
        };

        let service = scm
            .create_service(&info, ServiceAccess::CHANGE_CONFIG)
            .map_err(|e| ServusError::registrar("install", e.to_string()))?;

        service
            .set_description(identity.description.as_str())
            .map_err(|e| ServusError::registrar("describe", e.to_string()))
    }

    fn is_installed(&self, name: &str) -> Result<bool> {
        let scm = self.connect(ServiceManagerAccess::CONNECT)?;
        Ok(scm.open_service(name, ServiceAccess::QUERY_STATUS).is_ok())
    }

    fn is_running(&self, name: &str) -> Result<bool> {
        let service = self.open(name, ServiceAccess::QUERY_STATUS)?;
        let status = service
            .query_status()
            .map_err(|e| ServusError::registrar("query", e.to_string()))?;
        Ok(status.current_state != ServiceState::Stopped)
    }

    fn start(&self, name: &str) -> Result<()> {
        let service = self.open(name, ServiceAccess::START)?;
        service
            .start(&[] as &[&OsStr])
            .map_err(|e| ServusError::registrar("start", e.to_string()))
    }

    fn stop(&self, name: &str) -> Result<()> {
        let service = self.open(name, ServiceAccess::STOP)?;
        service
            .stop()
            .map(|_| ())
            .map_err(|e| ServusError::registrar("stop", e.to_string()))
    }

    fn remove(&self, name: &str) -> Result<()> {
        let service = self.open(name, ServiceAccess::DELETE)?;
        service
            .delete()
            .map_err(|e| ServusError::registrar("remove", e.to_string()))
    }
}
