//! Constant-valued accessors.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use sf_core::{Buffer2D, UserValue, VariableId};

use crate::element::{Interrupter, SyncAccessor};
use crate::error::{TransportError, TransportResult};

struct HaltPoint {
    shutdown: Mutex<bool>,
    wake: Condvar,
}

impl HaltPoint {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.shutdown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Interrupter for HaltPoint {
    fn interrupt(&self) {
        *self.lock() = true;
        self.wake.notify_all();
    }
}

/// Delivers a fixed value exactly once.
///
/// The first read returns the configured value; every further blocking read
/// parks until shutdown, and non-blocking reads return `false`. Writes are
/// accepted and ignored.
pub struct ConstantAccessor<T: UserValue> {
    value: T,
    buffer: Buffer2D<T>,
    first_read: bool,
    halt: Arc<HaltPoint>,
    variable_id: VariableId,
    name: String,
}

impl<T: UserValue> ConstantAccessor<T> {
    pub fn new(value: T, n_elements: usize, variable_id: VariableId) -> Self {
        let mut buffer = Buffer2D::scalar_shape(n_elements);
        buffer.fill(value.clone());
        Self {
            value,
            buffer,
            first_read: true,
            halt: Arc::new(HaltPoint {
                shutdown: Mutex::new(false),
                wake: Condvar::new(),
            }),
            variable_id,
            name: "Constant".to_string(),
        }
    }
}

impl<T: UserValue> SyncAccessor<T> for ConstantAccessor<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn variable_id(&self) -> VariableId {
        self.variable_id
    }

    fn is_readable(&self) -> bool {
        true
    }

    fn is_writeable(&self) -> bool {
        true
    }

    fn buffer(&self) -> &Buffer2D<T> {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut Buffer2D<T> {
        &mut self.buffer
    }

    fn interrupter(&self) -> Option<Arc<dyn Interrupter>> {
        Some(Arc::clone(&self.halt) as Arc<dyn Interrupter>)
    }

    fn do_read_transfer(&mut self) -> TransportResult<()> {
        if self.first_read {
            self.first_read = false;
            return Ok(());
        }
        // No further value will ever arrive; park until shutdown.
        let mut shutdown = self.halt.lock();
        while !*shutdown {
            shutdown = self
                .halt
                .wake
                .wait(shutdown)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Err(TransportError::Interrupted)
    }

    fn do_read_transfer_non_blocking(&mut self) -> TransportResult<bool> {
        if self.first_read {
            self.first_read = false;
            return Ok(true);
        }
        Ok(false)
    }

    fn post_read(&mut self) {
        // writes may have scribbled over the buffer; restore the value
        self.buffer.fill(self.value.clone());
    }

    fn do_write_transfer(
        &mut self,
        _version: sf_core::VersionNumber,
    ) -> TransportResult<bool> {
        Ok(false)
    }
}
