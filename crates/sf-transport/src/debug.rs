//! Transfer-logging decorator.

use std::sync::Arc;

use sf_core::{Buffer2D, UserValue, VariableId, VersionNumber};

use crate::element::{Interrupter, SyncAccessor};
use crate::error::TransportResult;

/// Logs every transfer of the wrapped accessor with its qualified name.
pub struct DebugAccessor<T: UserValue> {
    inner: Box<dyn SyncAccessor<T>>,
    qualified_name: String,
}

impl<T: UserValue> DebugAccessor<T> {
    pub fn new(inner: Box<dyn SyncAccessor<T>>, qualified_name: impl Into<String>) -> Self {
        Self {
            inner,
            qualified_name: qualified_name.into(),
        }
    }
}

impl<T: UserValue> SyncAccessor<T> for DebugAccessor<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn variable_id(&self) -> VariableId {
        self.inner.variable_id()
    }

    fn is_readable(&self) -> bool {
        self.inner.is_readable()
    }

    fn is_writeable(&self) -> bool {
        self.inner.is_writeable()
    }

    fn buffer(&self) -> &Buffer2D<T> {
        self.inner.buffer()
    }

    fn buffer_mut(&mut self) -> &mut Buffer2D<T> {
        self.inner.buffer_mut()
    }

    fn version(&self) -> VersionNumber {
        self.inner.version()
    }

    fn interrupter(&self) -> Option<Arc<dyn Interrupter>> {
        self.inner.interrupter()
    }

    fn queue_probe(&self) -> Option<Arc<dyn crate::testable::QueueProbe>> {
        self.inner.queue_probe()
    }

    fn pre_read(&mut self) {
        self.inner.pre_read();
    }

    fn do_read_transfer(&mut self) -> TransportResult<()> {
        self.inner.do_read_transfer()?;
        tracing::debug!(variable = %self.qualified_name, version = %self.inner.version(), "read");
        Ok(())
    }

    fn do_read_transfer_non_blocking(&mut self) -> TransportResult<bool> {
        let got = self.inner.do_read_transfer_non_blocking()?;
        if got {
            tracing::debug!(variable = %self.qualified_name, version = %self.inner.version(), "read (non-blocking)");
        }
        Ok(got)
    }

    fn post_read(&mut self) {
        self.inner.post_read();
    }

    fn pre_write(&mut self) {
        self.inner.pre_write();
    }

    fn do_write_transfer(&mut self, version: VersionNumber) -> TransportResult<bool> {
        let lost = self.inner.do_write_transfer(version)?;
        tracing::debug!(variable = %self.qualified_name, %version, data_lost = lost, "write");
        Ok(lost)
    }

    fn post_write(&mut self) {
        self.inner.post_write();
    }
}
