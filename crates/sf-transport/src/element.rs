//! The uniform accessor contract.
//!
//! Every concrete endpoint of a variable - device register, control-system
//! variable, one end of a synchronized transport pair, a constant, or a
//! fan-out - satisfies the same read/write protocol. The protocol is split
//! into pre/transfer/post stages so that fan-outs can fill all target
//! buffers before any transfer starts.

use std::sync::Arc;

use sf_core::{Buffer2D, UserValue, ValueType, VariableId, VersionNumber};

use crate::error::TransportResult;
use crate::testable::QueueProbe;

/// Wakes a blocking operation so its thread can observe shutdown.
///
/// Blocking primitives hand one of these to the application, which fires
/// them all during shutdown; woken operations return
/// [`TransportError::Interrupted`](crate::TransportError::Interrupted).
pub trait Interrupter: Send + Sync {
    fn interrupt(&self);
}

/// Identity and shape of an accessor, used for replacement capability
/// queries while the graph is patched.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessorDescriptor {
    pub name: String,
    pub variable_id: VariableId,
    pub value_type: ValueType,
    pub n_elements: usize,
}

/// Uniform contract over all accessor variants.
///
/// The convenience drivers `read`/`read_non_blocking`/`read_latest`/`write`
/// sequence the pre/transfer/post stages; implementations normally only
/// provide the `do_*` transfers. Decorators forward the stages and hook the
/// transfer calls.
pub trait SyncAccessor<T: UserValue>: Send {
    fn name(&self) -> &str;

    /// Stable runtime identity; both ends of one transport pair share it.
    fn variable_id(&self) -> VariableId;

    fn is_readable(&self) -> bool;

    fn is_writeable(&self) -> bool;

    fn is_read_only(&self) -> bool {
        self.is_readable() && !self.is_writeable()
    }

    /// The locally visible value buffer.
    fn buffer(&self) -> &Buffer2D<T>;

    fn buffer_mut(&mut self) -> &mut Buffer2D<T>;

    /// Version of the last value seen through this accessor.
    fn version(&self) -> VersionNumber {
        VersionNumber::ZERO
    }

    /// Interrupter waking any blocking operation of this accessor.
    fn interrupter(&self) -> Option<Arc<dyn Interrupter>> {
        None
    }

    /// Probe into the underlying queue, if there is one. The testable-mode
    /// stall listing uses it to distinguish unread data from data loss.
    fn queue_probe(&self) -> Option<Arc<dyn QueueProbe>> {
        None
    }

    fn descriptor(&self) -> AccessorDescriptor {
        AccessorDescriptor {
            name: self.name().to_string(),
            variable_id: self.variable_id(),
            value_type: T::VALUE_TYPE,
            n_elements: self.buffer().n_samples(),
        }
    }

    /// Whether this accessor may transparently stand in for `other` when
    /// the graph is patched.
    fn may_replace_other(&self, _other: &AccessorDescriptor) -> bool {
        false
    }

    fn pre_read(&mut self) {}

    /// Blocking transfer: waits for a new value (push) or performs the
    /// underlying transfer (poll).
    fn do_read_transfer(&mut self) -> TransportResult<()>;

    /// Non-blocking transfer; returns whether a new value was consumed.
    fn do_read_transfer_non_blocking(&mut self) -> TransportResult<bool>;

    /// Drain any queued values, keeping only the most recent one.
    fn do_read_transfer_latest(&mut self) -> TransportResult<bool> {
        let mut got = false;
        while self.do_read_transfer_non_blocking()? {
            got = true;
        }
        Ok(got)
    }

    fn post_read(&mut self) {}

    fn pre_write(&mut self) {}

    /// Write transfer; returns `true` iff the transport dropped a pending
    /// value to make room (data loss).
    fn do_write_transfer(&mut self, version: VersionNumber) -> TransportResult<bool>;

    fn post_write(&mut self) {}

    fn read(&mut self) -> TransportResult<()> {
        self.pre_read();
        self.do_read_transfer()?;
        self.post_read();
        Ok(())
    }

    fn read_non_blocking(&mut self) -> TransportResult<bool> {
        self.pre_read();
        let got = self.do_read_transfer_non_blocking()?;
        if got {
            self.post_read();
        }
        Ok(got)
    }

    fn read_latest(&mut self) -> TransportResult<bool> {
        self.pre_read();
        let got = self.do_read_transfer_latest()?;
        if got {
            self.post_read();
        }
        Ok(got)
    }

    fn write(&mut self) -> TransportResult<bool> {
        self.pre_write();
        let lost = self.do_write_transfer(VersionNumber::next())?;
        self.post_write();
        Ok(lost)
    }
}
