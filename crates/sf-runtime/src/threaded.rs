//! The threaded fan-out: a dedicated thread pushes the master's values to
//! all slaves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use sf_core::UserValue;
use sf_transport::{Interrupter, SyncAccessor, TestableGate, TransportError};

use crate::fanout::{InternalModule, SlaveList};

/// Distributes a push-mode feeder to N slaves from its own thread.
///
/// The thread blocks on the master's read and forwards each value to the
/// slaves in registration order. Deactivation interrupts the blocked read
/// and joins the thread.
pub(crate) struct ThreadedFanOut<T: UserValue> {
    name: String,
    master: Option<Box<dyn SyncAccessor<T>>>,
    slaves: Option<SlaveList<T>>,
    gate: Option<Arc<TestableGate>>,
    active: Arc<AtomicBool>,
    master_interrupter: Option<Arc<dyn Interrupter>>,
    thread: Option<JoinHandle<()>>,
}

impl<T: UserValue> ThreadedFanOut<T> {
    pub fn new(
        name: impl Into<String>,
        master: Box<dyn SyncAccessor<T>>,
        slaves: SlaveList<T>,
        gate: Option<Arc<TestableGate>>,
    ) -> Self {
        Self {
            name: name.into(),
            master: Some(master),
            slaves: Some(slaves),
            gate,
            active: Arc::new(AtomicBool::new(false)),
            master_interrupter: None,
            thread: None,
        }
    }
}

impl<T: UserValue> InternalModule for ThreadedFanOut<T> {
    fn activate(&mut self) {
        let (Some(mut master), Some(mut slaves)) = (self.master.take(), self.slaves.take())
        else {
            return;
        };
        self.master_interrupter = master.interrupter();
        self.active.store(true, Ordering::SeqCst);

        let active = Arc::clone(&self.active);
        let gate = self.gate.clone();
        let name = self.name.clone();
        let thread = std::thread::Builder::new()
            .name(format!("fanout-{name}"))
            .spawn(move || {
                if let Some(gate) = &gate {
                    if gate.acquire("fan-out start").is_err() {
                        return;
                    }
                }
                while active.load(Ordering::SeqCst) {
                    match master.read() {
                        Ok(()) => {}
                        Err(TransportError::Interrupted) => break,
                        Err(e) => {
                            tracing::error!(fan_out = %name, error = %e, "master read failed");
                            break;
                        }
                    }
                    tracing::trace!(fan_out = %name, "distributing value");
                    match slaves.distribute_and_write(master.buffer()) {
                        Ok(_lost) => {}
                        Err(TransportError::Interrupted) => break,
                        Err(e) => {
                            tracing::error!(fan_out = %name, error = %e, "slave write failed");
                            break;
                        }
                    }
                }
                if let Some(gate) = &gate {
                    gate.release("fan-out terminate");
                }
            });
        match thread {
            Ok(handle) => self.thread = Some(handle),
            Err(e) => tracing::error!(fan_out = %self.name, error = %e, "failed to spawn"),
        }
    }

    fn deactivate(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(interrupter) = &self.master_interrupter {
            interrupter.interrupt();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::VariableId;
    use sf_transport::transport_pair;

    #[test]
    fn forwards_values_until_deactivated() {
        let (mut feed, master) = transport_pair::<i32>("m", 1, 1, 4, VariableId::new(0));
        let (slave_tx, mut slave_rx) = transport_pair::<i32>("s", 1, 1, 4, VariableId::new(1));
        let mut slaves = SlaveList::new();
        slaves.add(Box::new(slave_tx)).unwrap();

        let mut fan_out = ThreadedFanOut::new("t", Box::new(master), slaves, None);
        fan_out.activate();

        for v in [4, 5, 6] {
            feed.buffer_mut().set_value(v).unwrap();
            feed.write().unwrap();
        }
        for expected in [4, 5, 6] {
            slave_rx.read().unwrap();
            assert_eq!(slave_rx.buffer().value(), Some(&expected));
        }

        fan_out.deactivate();
    }
}
