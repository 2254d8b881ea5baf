//! What ties a managed object to storage: its filename provider, gateway and
//! configuration.

use std::fmt;
use std::sync::Arc;

use filedao_storage::{Resource, StorageGateway};
use tracing::error;

use crate::config::DaoConfig;
use crate::error::PersistenceError;
use crate::filename::FilenameProvider;

pub(crate) struct Binding {
    filename_provider: Box<dyn FilenameProvider>,
    pub(crate) gateway: Arc<dyn StorageGateway>,
    pub(crate) config: DaoConfig,
}

impl Binding {
    pub(crate) fn new(
        filename_provider: Box<dyn FilenameProvider>,
        gateway: Arc<dyn StorageGateway>,
        config: DaoConfig,
    ) -> Self {
        Self {
            filename_provider,
            gateway,
            config,
        }
    }

    pub(crate) fn filename(&self) -> Option<String> {
        self.filename_provider.filename()
    }

    pub(crate) fn resolve(&self, filename: &str) -> Resource {
        self.gateway.resolve(filename)
    }

    /// Wraps a read/initialization failure, hands it to the read handler and
    /// returns it for propagation.
    pub(crate) fn read_failure(
        &self,
        filename: Option<&str>,
        is_initialization: bool,
        source: PersistenceError,
    ) -> PersistenceError {
        let err = PersistenceError::read(filename, is_initialization, source);
        error!("{}", err);
        let resource = filename.map(|f| self.resolve(f));
        self.config
            .handlers
            .report_read(&err, is_initialization, resource.as_ref());
        err
    }

    /// Logs a write failure and hands it to the write handler.
    pub(crate) fn write_failure(
        &self,
        resource: &Resource,
        err: &PersistenceError,
        attempted: &str,
    ) {
        error!("Failed to write to {}: {}", resource, err);
        self.config.handlers.report_write(err, resource, attempted);
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("filename", &self.filename())
            .field("config", &self.config)
            .finish()
    }
}
