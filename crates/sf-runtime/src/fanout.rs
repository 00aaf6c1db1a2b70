//! Thread-less fan-outs and the shared slave list.
//!
//! A fan-out distributes the values of one feeding source ("master") to a
//! set of downstream accessors ("slaves"). The feeding and consuming
//! variants here are driven synchronously by the caller; the threaded and
//! trigger variants run their own threads (see `threaded`/`trigger`).

use sf_core::{Buffer2D, UserValue, VariableId, VersionNumber};
use sf_transport::{SyncAccessor, TransportError, TransportResult};

use crate::error::{RuntimeError, RuntimeResult};

/// Lifecycle of runtime-internal machinery with threads.
///
/// Fan-out threads are activated before any module thread starts and
/// deactivated before module threads are interrupted. The slave lists are
/// append-only before `activate()` and immutable after.
pub(crate) trait InternalModule: Send {
    fn activate(&mut self);
    fn deactivate(&mut self);
}

/// The ordered slave list shared by all fan-out variants.
pub(crate) struct SlaveList<T: UserValue> {
    slaves: Vec<Box<dyn SyncAccessor<T>>>,
}

impl<T: UserValue> SlaveList<T> {
    pub fn new() -> Self {
        Self { slaves: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.slaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slaves.is_empty()
    }

    /// Append a slave. Slaves must be write-capable; array shapes must
    /// match across all slaves that expect data. Trigger receivers are
    /// zero-element and exempt from the shape check.
    pub fn add(&mut self, slave: Box<dyn SyncAccessor<T>>) -> RuntimeResult<()> {
        if !slave.is_writeable() {
            return Err(RuntimeError::IllegalParameter {
                what: format!(
                    "fan-out slave '{}' is a receiving implementation",
                    slave.name()
                ),
            });
        }
        if slave.buffer().n_samples() != 0 {
            if let Some(reference) = self.first_data_slave() {
                let (channels, samples) =
                    (reference.buffer().n_channels(), reference.buffer().n_samples());
                if slave.buffer().n_channels() != channels
                    || slave.buffer().n_samples() != samples
                {
                    return Err(RuntimeError::IllegalParameter {
                        what: format!(
                            "fan-out slave '{}' has an incompatible array shape \
                             (first slave: '{}')",
                            slave.name(),
                            reference.name()
                        ),
                    });
                }
            }
        }
        self.slaves.push(slave);
        Ok(())
    }

    fn first_data_slave(&self) -> Option<&Box<dyn SyncAccessor<T>>> {
        self.slaves.iter().find(|s| s.buffer().n_samples() != 0)
    }

    /// Copy `source` into every data slave and write all slaves in
    /// registration order, OR-accumulating data loss.
    pub fn distribute_and_write(&mut self, source: &Buffer2D<T>) -> TransportResult<bool> {
        let version = VersionNumber::next();
        for slave in &mut self.slaves {
            if slave.buffer().n_samples() != 0 {
                slave.buffer_mut().channel_mut(0).clone_from_slice(source.channel(0));
            }
        }
        let mut lost = false;
        for slave in &mut self.slaves {
            slave.pre_write();
            lost |= slave.do_write_transfer(version)?;
            slave.post_write();
        }
        Ok(lost)
    }

    /// The write sequence of the feeding fan-out: swap the user buffer into
    /// the first data slave, copy it into the rest, run all `pre_write`
    /// stages only after every buffer is filled, transfer, and swap back so
    /// the user buffer stays observable.
    pub fn fan_write(
        &mut self,
        user_buffer: &mut Buffer2D<T>,
        version: VersionNumber,
    ) -> TransportResult<bool> {
        let mut first_data: Option<usize> = None;
        let mut staged: Vec<T> = Vec::new();
        for (index, slave) in self.slaves.iter_mut().enumerate() {
            if slave.buffer().n_samples() == 0 {
                continue;
            }
            if first_data.is_none() {
                slave.buffer_mut().swap_channel0(user_buffer.channel_mut(0));
                staged = slave.buffer().channel(0).to_vec();
                first_data = Some(index);
            } else {
                slave.buffer_mut().channel_mut(0).clone_from_slice(&staged);
            }
        }

        for slave in &mut self.slaves {
            slave.pre_write();
        }
        let mut lost = false;
        for slave in &mut self.slaves {
            lost |= slave.do_write_transfer(version)?;
        }
        for slave in &mut self.slaves {
            slave.post_write();
        }

        if let Some(index) = first_data {
            self.slaves[index]
                .buffer_mut()
                .swap_channel0(user_buffer.channel_mut(0));
        }
        Ok(lost)
    }
}

/// Write endpoint of an application feeder with two or more consumers.
///
/// The application writes once; the fan-out copies the value to all
/// downstream targets synchronously.
pub(crate) struct FeedingFanOut<T: UserValue> {
    name: String,
    variable_id: VariableId,
    buffer: Buffer2D<T>,
    version: VersionNumber,
    slaves: SlaveList<T>,
}

impl<T: UserValue> FeedingFanOut<T> {
    pub fn new(name: impl Into<String>, variable_id: VariableId, n_elements: usize) -> Self {
        Self {
            name: name.into(),
            variable_id,
            buffer: Buffer2D::scalar_shape(n_elements),
            version: VersionNumber::ZERO,
            slaves: SlaveList::new(),
        }
    }

    pub fn add_slave(&mut self, slave: Box<dyn SyncAccessor<T>>) -> RuntimeResult<()> {
        self.slaves.add(slave)
    }
}

impl<T: UserValue> SyncAccessor<T> for FeedingFanOut<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn variable_id(&self) -> VariableId {
        self.variable_id
    }

    fn is_readable(&self) -> bool {
        false
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

    fn version(&self) -> VersionNumber {
        self.version
    }

    fn do_read_transfer(&mut self) -> TransportResult<()> {
        Err(TransportError::LogicError {
            what: format!("read operation called on write-only variable '{}'", self.name),
        })
    }

    fn do_read_transfer_non_blocking(&mut self) -> TransportResult<bool> {
        Err(TransportError::LogicError {
            what: format!("read operation called on write-only variable '{}'", self.name),
        })
    }

    fn do_write_transfer(&mut self, version: VersionNumber) -> TransportResult<bool> {
        self.version = version;
        self.slaves.fan_write(&mut self.buffer, version)
    }
}

/// Poll-mode distributor: transfers lazily on the application consumer's
/// read, sharing the value with the other slaves mid-transfer.
///
/// Exactly one polling application consumer may own it; that consumer reads
/// directly from the master's buffer.
pub(crate) struct ConsumingFanOut<T: UserValue> {
    master: Box<dyn SyncAccessor<T>>,
    slaves: SlaveList<T>,
}

impl<T: UserValue> ConsumingFanOut<T> {
    pub fn new(master: Box<dyn SyncAccessor<T>>, slaves: SlaveList<T>) -> Self {
        Self { master, slaves }
    }

    fn distribute(&mut self) -> TransportResult<()> {
        if self.slaves.is_empty() {
            return Ok(());
        }
        self.slaves.distribute_and_write(self.master.buffer())?;
        Ok(())
    }
}

impl<T: UserValue> SyncAccessor<T> for ConsumingFanOut<T> {
    fn name(&self) -> &str {
        self.master.name()
    }

    fn variable_id(&self) -> VariableId {
        self.master.variable_id()
    }

    fn is_readable(&self) -> bool {
        true
    }

    fn is_writeable(&self) -> bool {
        false
    }

    fn buffer(&self) -> &Buffer2D<T> {
        self.master.buffer()
    }

    fn buffer_mut(&mut self) -> &mut Buffer2D<T> {
        self.master.buffer_mut()
    }

    fn version(&self) -> VersionNumber {
        self.master.version()
    }

    fn interrupter(&self) -> Option<std::sync::Arc<dyn sf_transport::Interrupter>> {
        self.master.interrupter()
    }

    fn pre_read(&mut self) {
        self.master.pre_read();
    }

    fn do_read_transfer(&mut self) -> TransportResult<()> {
        self.master.do_read_transfer()?;
        self.distribute()
    }

    fn do_read_transfer_non_blocking(&mut self) -> TransportResult<bool> {
        let got = self.master.do_read_transfer_non_blocking()?;
        if got {
            self.distribute()?;
        }
        Ok(got)
    }

    fn post_read(&mut self) {
        self.master.post_read();
    }

    fn do_write_transfer(&mut self, _version: VersionNumber) -> TransportResult<bool> {
        Err(TransportError::LogicError {
            what: format!("write operation called on read-only variable '{}'", self.name()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_transport::transport_pair;

    #[test]
    fn feeding_fan_out_copies_to_all_slaves() {
        let mut fan_out = FeedingFanOut::<f32>::new("vec", VariableId::new(0), 4);
        let (tx1, mut rx1) = transport_pair::<f32>("a", 1, 4, 3, VariableId::new(1));
        let (tx2, mut rx2) = transport_pair::<f32>("b", 1, 4, 3, VariableId::new(2));
        fan_out.add_slave(Box::new(tx1)).unwrap();
        fan_out.add_slave(Box::new(tx2)).unwrap();

        fan_out
            .buffer_mut()
            .channel_mut(0)
            .clone_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert!(!fan_out.write().unwrap());

        rx1.read().unwrap();
        rx2.read().unwrap();
        assert_eq!(rx1.buffer().channel(0), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(rx2.buffer().channel(0), &[1.0, 2.0, 3.0, 4.0]);
        // the writer's buffer is still observable after the write
        assert_eq!(fan_out.buffer().channel(0), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn feeding_fan_out_rejects_shape_mismatch() {
        let mut fan_out = FeedingFanOut::<i32>::new("vec", VariableId::new(0), 4);
        let (tx1, _rx1) = transport_pair::<i32>("a", 1, 4, 3, VariableId::new(1));
        let (tx2, _rx2) = transport_pair::<i32>("b", 1, 2, 3, VariableId::new(2));
        fan_out.add_slave(Box::new(tx1)).unwrap();
        assert!(matches!(
            fan_out.add_slave(Box::new(tx2)),
            Err(RuntimeError::IllegalParameter { .. })
        ));
    }

    #[test]
    fn feeding_fan_out_rejects_receiving_slaves() {
        let mut fan_out = FeedingFanOut::<i32>::new("x", VariableId::new(0), 1);
        let (_tx, rx) = transport_pair::<i32>("a", 1, 1, 3, VariableId::new(1));
        assert!(matches!(
            fan_out.add_slave(Box::new(rx)),
            Err(RuntimeError::IllegalParameter { .. })
        ));
    }

    #[test]
    fn read_on_feeding_fan_out_is_a_logic_error() {
        let mut fan_out = FeedingFanOut::<i32>::new("x", VariableId::new(0), 1);
        assert!(matches!(
            fan_out.read(),
            Err(TransportError::LogicError { .. })
        ));
    }

    #[test]
    fn consuming_fan_out_distributes_on_read() {
        // master: consuming end fed by a pair
        let (mut feed, master) = transport_pair::<i16>("m", 1, 2, 3, VariableId::new(0));
        let (slave_tx, mut slave_rx) = transport_pair::<i16>("s", 1, 2, 3, VariableId::new(1));
        let mut slaves = SlaveList::new();
        slaves.add(Box::new(slave_tx)).unwrap();
        let mut fan_out = ConsumingFanOut::new(Box::new(master), slaves);

        feed.buffer_mut().channel_mut(0).clone_from_slice(&[5, 6]);
        feed.write().unwrap();

        fan_out.read().unwrap();
        assert_eq!(fan_out.buffer().channel(0), &[5, 6]);
        slave_rx.read().unwrap();
        assert_eq!(slave_rx.buffer().channel(0), &[5, 6]);

        assert!(matches!(
            fan_out.write(),
            Err(TransportError::LogicError { .. })
        ));
    }
}
