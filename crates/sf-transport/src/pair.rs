//! The synchronized transport pair.
//!
//! A bounded queue of value buffers shared between a feeding end and a
//! consuming end. Writes stamp a fresh global version number; overflow
//! drops the oldest pending value and reports data loss to the writer.
//! Delivery within one pair is FIFO with strictly increasing versions.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use sf_core::{Buffer2D, UserValue, VariableId, VersionNumber};

use crate::element::{Interrupter, SyncAccessor};
use crate::error::{TransportError, TransportResult};
use crate::testable::QueueProbe;

struct QueueState<T> {
    queue: VecDeque<(Buffer2D<T>, VersionNumber)>,
    shutdown: bool,
}

pub(crate) struct PairShared<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    capacity: usize,
}

impl<T: UserValue> PairShared<T> {
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: UserValue> Interrupter for PairShared<T> {
    fn interrupt(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        self.not_empty.notify_all();
    }
}

impl<T: UserValue> QueueProbe for PairShared<T> {
    fn has_pending(&self) -> bool {
        !self.lock().queue.is_empty()
    }
}

/// Writing side of a synchronized pair.
pub struct FeedingEnd<T: UserValue> {
    shared: Arc<PairShared<T>>,
    buffer: Buffer2D<T>,
    version: VersionNumber,
    name: String,
    variable_id: VariableId,
}

/// Reading side of a synchronized pair.
pub struct ConsumingEnd<T: UserValue> {
    shared: Arc<PairShared<T>>,
    buffer: Buffer2D<T>,
    version: VersionNumber,
    name: String,
    variable_id: VariableId,
}

/// Create a synchronized pair sharing a queue of at most `capacity` values.
///
/// Both ends carry the same [`VariableId`]; `name` labels diagnostics.
pub fn transport_pair<T: UserValue>(
    name: impl Into<String>,
    n_channels: usize,
    n_samples: usize,
    capacity: usize,
    variable_id: VariableId,
) -> (FeedingEnd<T>, ConsumingEnd<T>) {
    let name = name.into();
    let shared = Arc::new(PairShared {
        state: Mutex::new(QueueState {
            queue: VecDeque::new(),
            shutdown: false,
        }),
        not_empty: Condvar::new(),
        capacity: capacity.max(1),
    });
    let feeding = FeedingEnd {
        shared: Arc::clone(&shared),
        buffer: Buffer2D::new(n_channels, n_samples),
        version: VersionNumber::ZERO,
        name: name.clone(),
        variable_id,
    };
    let consuming = ConsumingEnd {
        shared,
        buffer: Buffer2D::new(n_channels, n_samples),
        version: VersionNumber::ZERO,
        name,
        variable_id,
    };
    (feeding, consuming)
}

impl<T: UserValue> SyncAccessor<T> for FeedingEnd<T> {
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

    fn interrupter(&self) -> Option<Arc<dyn Interrupter>> {
        Some(Arc::clone(&self.shared) as Arc<dyn Interrupter>)
    }

    fn queue_probe(&self) -> Option<Arc<dyn QueueProbe>> {
        Some(Arc::clone(&self.shared) as Arc<dyn QueueProbe>)
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
        let mut state = self.shared.lock();
        if state.shutdown {
            return Err(TransportError::Interrupted);
        }
        let mut lost = false;
        if state.queue.len() >= self.shared.capacity {
            state.queue.pop_front();
            lost = true;
        }
        state.queue.push_back((self.buffer.clone(), version));
        self.version = version;
        self.shared.not_empty.notify_all();
        Ok(lost)
    }
}

impl<T: UserValue> SyncAccessor<T> for ConsumingEnd<T> {
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
        false
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

    fn interrupter(&self) -> Option<Arc<dyn Interrupter>> {
        Some(Arc::clone(&self.shared) as Arc<dyn Interrupter>)
    }

    fn queue_probe(&self) -> Option<Arc<dyn QueueProbe>> {
        Some(Arc::clone(&self.shared) as Arc<dyn QueueProbe>)
    }

    fn do_read_transfer(&mut self) -> TransportResult<()> {
        let mut state = self.shared.lock();
        loop {
            if let Some((buffer, version)) = state.queue.pop_front() {
                self.buffer = buffer;
                self.version = version;
                return Ok(());
            }
            if state.shutdown {
                return Err(TransportError::Interrupted);
            }
            state = self
                .shared
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn do_read_transfer_non_blocking(&mut self) -> TransportResult<bool> {
        let mut state = self.shared.lock();
        match state.queue.pop_front() {
            Some((buffer, version)) => {
                self.buffer = buffer;
                self.version = version;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn do_write_transfer(&mut self, _version: VersionNumber) -> TransportResult<bool> {
        Err(TransportError::LogicError {
            what: format!("write operation called on read-only variable '{}'", self.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_delivery_with_increasing_versions() {
        let (mut tx, mut rx) = transport_pair::<i32>("t", 1, 1, 3, VariableId::new(0));
        for v in [1, 2, 3] {
            tx.buffer_mut().set_value(v).unwrap();
            assert!(!tx.write().unwrap());
        }
        let mut last_version = VersionNumber::ZERO;
        for expected in [1, 2, 3] {
            rx.read().unwrap();
            assert_eq!(rx.buffer().value(), Some(&expected));
            assert!(rx.version() > last_version);
            last_version = rx.version();
        }
    }

    #[test]
    fn overflow_drops_oldest_and_reports_loss() {
        let (mut tx, mut rx) = transport_pair::<u8>("t", 1, 1, 2, VariableId::new(0));
        for v in [10, 20] {
            tx.buffer_mut().set_value(v).unwrap();
            assert!(!tx.write().unwrap());
        }
        tx.buffer_mut().set_value(30).unwrap();
        assert!(tx.write().unwrap());

        rx.read().unwrap();
        assert_eq!(rx.buffer().value(), Some(&20));
        rx.read().unwrap();
        assert_eq!(rx.buffer().value(), Some(&30));
        assert!(!rx.read_non_blocking().unwrap());
    }

    #[test]
    fn read_latest_drains_to_most_recent() {
        let (mut tx, mut rx) = transport_pair::<i16>("t", 1, 1, 4, VariableId::new(0));
        for v in [1, 2, 3] {
            tx.buffer_mut().set_value(v).unwrap();
            tx.write().unwrap();
        }
        assert!(rx.read_latest().unwrap());
        assert_eq!(rx.buffer().value(), Some(&3));
        assert!(!rx.read_latest().unwrap());
    }

    #[test]
    fn interrupt_wakes_blocking_read() {
        let (tx, mut rx) = transport_pair::<i32>("t", 1, 1, 3, VariableId::new(0));
        let interrupter = tx.interrupter().unwrap();
        let handle = std::thread::spawn(move || rx.read());
        std::thread::sleep(std::time::Duration::from_millis(20));
        interrupter.interrupt();
        assert_eq!(handle.join().unwrap(), Err(TransportError::Interrupted));
    }

    #[test]
    fn wrong_direction_is_a_logic_error() {
        let (mut tx, mut rx) = transport_pair::<i32>("t", 1, 1, 3, VariableId::new(0));
        assert!(matches!(
            tx.read(),
            Err(TransportError::LogicError { .. })
        ));
        assert!(matches!(
            rx.write(),
            Err(TransportError::LogicError { .. })
        ));
    }
}
