//! The trigger fan-out: one wake-up distributes N independent poll feeders.
//!
//! One trigger fan-out exists per distinct trigger source; every network
//! driven by that trigger registers a group. On each tick the fan-out reads
//! each group's feeder once and distributes the value to that group's
//! consumer set, so all consumers observe values read in the same pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use sf_core::{dispatch_value_type, UserValue};
use sf_transport::{
    AnyAccessor, Interrupter, SyncAccessor, TestableGate, TransportError, TransportResult,
    TypedAccessorExt,
};

use crate::fanout::{InternalModule, SlaveList};

/// Type-erased wait on the trigger variable; the tick value is discarded.
trait TickSource: Send {
    fn wait_tick(&mut self) -> TransportResult<()>;
    fn interrupter(&self) -> Option<Arc<dyn Interrupter>>;
}

struct TickReader<T: UserValue> {
    inner: Box<dyn SyncAccessor<T>>,
}

impl<T: UserValue> TickSource for TickReader<T> {
    fn wait_tick(&mut self) -> TransportResult<()> {
        self.inner.read()
    }

    fn interrupter(&self) -> Option<Arc<dyn Interrupter>> {
        self.inner.interrupter()
    }
}

/// One triggered subnetwork: a poll feeder plus its consumer set.
pub(crate) trait TriggeredGroup: Send {
    fn transfer_once(&mut self) -> TransportResult<()>;
}

/// Reads a poll-mode feeder and pushes the value to the group's slaves.
pub(crate) struct PollGroup<T: UserValue> {
    feeder: Box<dyn SyncAccessor<T>>,
    slaves: SlaveList<T>,
}

impl<T: UserValue> PollGroup<T> {
    pub fn new(feeder: Box<dyn SyncAccessor<T>>, slaves: SlaveList<T>) -> Self {
        Self { feeder, slaves }
    }
}

impl<T: UserValue> TriggeredGroup for PollGroup<T> {
    fn transfer_once(&mut self) -> TransportResult<()> {
        self.feeder.read()?;
        self.slaves.distribute_and_write(self.feeder.buffer())?;
        Ok(())
    }
}

/// Collapses all triggered pulls of one trigger source into one wake-up.
pub(crate) struct TriggerFanOut {
    name: String,
    tick: Option<Box<dyn TickSource>>,
    groups: Option<Vec<Box<dyn TriggeredGroup>>>,
    gate: Option<Arc<TestableGate>>,
    active: Arc<AtomicBool>,
    tick_interrupter: Option<Arc<dyn Interrupter>>,
    thread: Option<JoinHandle<()>>,
}

impl TriggerFanOut {
    pub fn new(name: impl Into<String>, tick: AnyAccessor, gate: Option<Arc<TestableGate>>) -> Self {
        let tick_source: Box<dyn TickSource> = dispatch_value_type!(tick.value_type(), |U| {
            match U::into_typed(tick) {
                Some(inner) => Box::new(TickReader::<U> { inner }),
                // the tag of an AnyAccessor always matches its payload
                None => unreachable!("tagged accessor bundle is self-consistent"),
            }
        });
        Self {
            name: name.into(),
            tick: Some(tick_source),
            groups: Some(Vec::new()),
            gate,
            active: Arc::new(AtomicBool::new(false)),
            tick_interrupter: None,
            thread: None,
        }
    }

    /// Register a triggered subnetwork. Only valid before `activate()`.
    pub fn add_group(&mut self, group: Box<dyn TriggeredGroup>) {
        if let Some(groups) = &mut self.groups {
            groups.push(group);
        }
    }
}

impl InternalModule for TriggerFanOut {
    fn activate(&mut self) {
        let (Some(mut tick), Some(mut groups)) = (self.tick.take(), self.groups.take()) else {
            return;
        };
        self.tick_interrupter = tick.interrupter();
        self.active.store(true, Ordering::SeqCst);

        let active = Arc::clone(&self.active);
        let gate = self.gate.clone();
        let name = self.name.clone();
        let thread = std::thread::Builder::new()
            .name(format!("trigger-{name}"))
            .spawn(move || {
                if let Some(gate) = &gate {
                    if gate.acquire("trigger start").is_err() {
                        return;
                    }
                }
                'outer: while active.load(Ordering::SeqCst) {
                    match tick.wait_tick() {
                        Ok(()) => {}
                        Err(TransportError::Interrupted) => break,
                        Err(e) => {
                            tracing::error!(trigger = %name, error = %e, "tick read failed");
                            break;
                        }
                    }
                    tracing::trace!(trigger = %name, "distributing one trigger pass");
                    for group in &mut groups {
                        match group.transfer_once() {
                            Ok(()) => {}
                            Err(TransportError::Interrupted) => break 'outer,
                            Err(e) => {
                                tracing::error!(trigger = %name, error = %e, "transfer failed");
                                break 'outer;
                            }
                        }
                    }
                }
                if let Some(gate) = &gate {
                    gate.release("trigger terminate");
                }
            });
        match thread {
            Ok(handle) => self.thread = Some(handle),
            Err(e) => tracing::error!(trigger = %self.name, error = %e, "failed to spawn"),
        }
    }

    fn deactivate(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(interrupter) = &self.tick_interrupter {
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
    fn one_distribution_pass_per_tick() {
        // trigger variable
        let (mut tick_tx, tick_rx) = transport_pair::<i32>("tick", 1, 1, 8, VariableId::new(0));
        // triggered feeder, pre-loaded with values the group will pull
        let (mut feeder_tx, feeder_rx) =
            transport_pair::<i16>("feeder", 1, 1, 8, VariableId::new(1));
        let (slave_tx, mut slave_rx) = transport_pair::<i16>("s", 1, 1, 8, VariableId::new(2));

        let mut slaves = SlaveList::new();
        slaves.add(Box::new(slave_tx)).unwrap();
        let group = PollGroup::new(Box::new(feeder_rx), slaves);

        let mut fan_out =
            TriggerFanOut::new("tick", i32::into_any(Box::new(tick_rx)), None);
        fan_out.add_group(Box::new(group));
        fan_out.activate();

        for v in [7, 8, 9] {
            feeder_tx.buffer_mut().set_value(v).unwrap();
            feeder_tx.write().unwrap();
            tick_tx.buffer_mut().set_value(1).unwrap();
            tick_tx.write().unwrap();
        }
        for expected in [7, 8, 9] {
            slave_rx.read().unwrap();
            assert_eq!(slave_rx.buffer().value(), Some(&expected));
        }

        fan_out.deactivate();
    }
}
