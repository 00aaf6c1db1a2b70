//! In-memory implementations of the consumed contracts, for tests and
//! examples: a scripted device backend and a control-system adapter whose
//! far ends are addressable by public name.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sf_core::{dispatch_value_type, Buffer2D, UserValue, ValueType, VariableId, VersionNumber};
use sf_transport::{
    transport_pair, AnyAccessor, ControlSystemAdapter, DeviceBackend, SyncAccessor, SyncDirection,
    TestableGate, TransportError, TransportResult, TypedAccessorExt,
};

use crate::error::{RuntimeError, RuntimeResult};

#[derive(Default)]
struct RegisterState {
    sequence: VecDeque<f64>,
    current: f64,
    reads: usize,
    written: Vec<Vec<f64>>,
}

#[derive(Default)]
struct BackendState {
    registers: HashMap<String, RegisterState>,
    push_feeds: HashMap<String, AnyAccessor>,
    accessor_requests: HashMap<String, usize>,
}

/// A scripted in-memory device backend.
///
/// Poll registers serve a scripted value sequence (sticking to the last
/// value once exhausted) and record every read and write. Push registers
/// deliver values queued with [`push_value`](Self::push_value).
#[derive(Default)]
pub struct MemoryBackend {
    open: AtomicBool,
    state: Arc<Mutex<BackendState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the current value of a poll register.
    pub fn set_value(&self, register_path: &str, value: f64) {
        self.lock().registers.entry(register_path.to_string()).or_default().current = value;
    }

    /// Script a sequence of values; each poll read consumes one.
    pub fn set_sequence(&self, register_path: &str, values: &[f64]) {
        let mut state = self.lock();
        let register = state.registers.entry(register_path.to_string()).or_default();
        register.sequence = values.iter().copied().collect();
    }

    /// Deliver one value to a push-mode register.
    pub fn push_value(&self, register_path: &str, value: f64) -> RuntimeResult<()> {
        let mut state = self.lock();
        let feed = state.push_feeds.get_mut(register_path).ok_or_else(|| {
            RuntimeError::IllegalParameter {
                what: format!("no push register '{register_path}' has been requested"),
            }
        })?;
        dispatch_value_type!(feed.value_type(), |U| {
            match U::typed_mut(feed) {
                Some(accessor) => {
                    let typed = U::from_f64(value);
                    accessor.buffer_mut().fill(typed);
                    accessor.write()?;
                    Ok(())
                }
                None => Err(RuntimeError::from(TransportError::LogicError {
                    what: "tagged accessor bundle is self-consistent".to_string(),
                })),
            }
        })
    }

    /// How often a register was read.
    pub fn read_count(&self, register_path: &str) -> usize {
        self.lock()
            .registers
            .get(register_path)
            .map_or(0, |r| r.reads)
    }

    /// All values written to a register, in order.
    pub fn written(&self, register_path: &str) -> Vec<Vec<f64>> {
        self.lock()
            .registers
            .get(register_path)
            .map_or_else(Vec::new, |r| r.written.clone())
    }

    /// How many accessors were requested for a register. After the
    /// device-feeder optimisation a register subscribed by several networks
    /// must still be requested only once.
    pub fn accessor_requests(&self, register_path: &str) -> usize {
        self.lock()
            .accessor_requests
            .get(register_path)
            .copied()
            .unwrap_or(0)
    }
}

impl DeviceBackend for MemoryBackend {
    fn open(&self) -> TransportResult<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn register_accessor(
        &self,
        register_path: &str,
        value_type: ValueType,
        n_elements: usize,
        wait_for_new_data: bool,
        variable_id: VariableId,
    ) -> TransportResult<AnyAccessor> {
        let mut state = self.lock();
        *state
            .accessor_requests
            .entry(register_path.to_string())
            .or_insert(0) += 1;
        if wait_for_new_data {
            // push register: backed by a pair whose feeding end stays with
            // the backend
            let any = dispatch_value_type!(value_type, |U| {
                let (feed, accessor) =
                    transport_pair::<U>(register_path, 1, n_elements, 8, variable_id);
                state
                    .push_feeds
                    .insert(register_path.to_string(), U::into_any(Box::new(feed)));
                U::into_any(Box::new(accessor))
            });
            return Ok(any);
        }
        state.registers.entry(register_path.to_string()).or_default();
        let shared = Arc::clone(&self.state);
        let any = dispatch_value_type!(value_type, |U| {
            U::into_any(Box::new(MemoryRegister::<U> {
                path: register_path.to_string(),
                variable_id,
                buffer: Buffer2D::scalar_shape(n_elements),
                version: VersionNumber::ZERO,
                state: shared,
            }))
        });
        Ok(any)
    }
}

/// A poll/write register of the [`MemoryBackend`].
struct MemoryRegister<T: UserValue> {
    path: String,
    variable_id: VariableId,
    buffer: Buffer2D<T>,
    version: VersionNumber,
    state: Arc<Mutex<BackendState>>,
}

impl<T: UserValue> MemoryRegister<T> {
    fn poll_once(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let register = state.registers.entry(self.path.clone()).or_default();
        register.reads += 1;
        if let Some(next) = register.sequence.pop_front() {
            register.current = next;
        }
        let value = T::from_f64(register.current);
        drop(state);
        self.buffer.fill(value);
        self.version = VersionNumber::next();
    }
}

impl<T: UserValue> SyncAccessor<T> for MemoryRegister<T> {
    fn name(&self) -> &str {
        &self.path
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

    fn version(&self) -> VersionNumber {
        self.version
    }

    fn do_read_transfer(&mut self) -> TransportResult<()> {
        // poll transfer: never blocks
        self.poll_once();
        Ok(())
    }

    fn do_read_transfer_non_blocking(&mut self) -> TransportResult<bool> {
        self.poll_once();
        Ok(true)
    }

    fn do_read_transfer_latest(&mut self) -> TransportResult<bool> {
        self.poll_once();
        Ok(true)
    }

    fn do_write_transfer(&mut self, version: VersionNumber) -> TransportResult<bool> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let register = state.registers.entry(self.path.clone()).or_default();
        register
            .written
            .push(self.buffer.channel(0).iter().map(UserValue::to_f64).collect());
        register.current = self.buffer.channel(0).first().map_or(0.0, UserValue::to_f64);
        self.version = version;
        Ok(false)
    }
}

struct TestVariable {
    far_end: AnyAccessor,
    variable_id: VariableId,
    direction: SyncDirection,
}

#[derive(Default)]
struct AdapterState {
    gate: Option<Arc<TestableGate>>,
    vars: HashMap<String, TestVariable>,
}

/// Control-system adapter for tests.
///
/// Keeps the far end of every exported variable, addressable by public
/// name: [`feed`](Self::feed) plays the control system writing into the
/// application, [`receive`](Self::receive) reads what the application
/// published.
#[derive(Default)]
pub struct TestAdapter {
    queue_depth: usize,
    state: Mutex<AdapterState>,
}

impl TestAdapter {
    pub fn new() -> Self {
        Self::with_queue_depth(3)
    }

    pub fn with_queue_depth(queue_depth: usize) -> Self {
        Self {
            queue_depth: queue_depth.max(1),
            state: Mutex::new(AdapterState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AdapterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write one value vector into a control-system-to-application
    /// variable, as the control system would.
    pub fn feed<T: UserValue + TypedAccessorExt>(
        &self,
        public_name: &str,
        values: &[T],
    ) -> RuntimeResult<()> {
        let mut state = self.lock();
        let gate = state.gate.clone();
        let variable = state.vars.get_mut(public_name).ok_or_else(|| {
            RuntimeError::IllegalParameter {
                what: format!("unknown control-system variable '{public_name}'"),
            }
        })?;
        if variable.direction != SyncDirection::ControlSystemToDevice {
            return Err(RuntimeError::IllegalParameter {
                what: format!("'{public_name}' is not writable from the control system side"),
            });
        }
        let variable_id = variable.variable_id;
        let accessor = T::typed_mut(&mut variable.far_end).ok_or_else(|| {
            RuntimeError::IllegalParameter {
                what: format!("'{public_name}' has a different value type"),
            }
        })?;
        let channel = accessor.buffer_mut().channel_mut(0);
        if channel.len() != values.len() {
            return Err(RuntimeError::IllegalParameter {
                what: format!(
                    "'{public_name}' holds {} elements, got {}",
                    channel.len(),
                    values.len()
                ),
            });
        }
        channel.clone_from_slice(values);
        accessor.write()?;
        if let Some(gate) = gate {
            gate.increment(variable_id);
        }
        Ok(())
    }

    /// Single-element convenience for [`feed`](Self::feed).
    pub fn feed_value<T: UserValue + TypedAccessorExt>(
        &self,
        public_name: &str,
        value: T,
    ) -> RuntimeResult<()> {
        self.feed(public_name, &[value])
    }

    /// Non-blocking read of an application-to-control-system variable.
    pub fn receive<T: UserValue + TypedAccessorExt>(
        &self,
        public_name: &str,
    ) -> RuntimeResult<Option<Vec<T>>> {
        let mut state = self.lock();
        let variable = state.vars.get_mut(public_name).ok_or_else(|| {
            RuntimeError::IllegalParameter {
                what: format!("unknown control-system variable '{public_name}'"),
            }
        })?;
        if variable.direction != SyncDirection::DeviceToControlSystem {
            return Err(RuntimeError::IllegalParameter {
                what: format!("'{public_name}' is not readable from the control system side"),
            });
        }
        let accessor = T::typed_mut(&mut variable.far_end).ok_or_else(|| {
            RuntimeError::IllegalParameter {
                what: format!("'{public_name}' has a different value type"),
            }
        })?;
        if accessor.read_non_blocking()? {
            Ok(Some(accessor.buffer().channel(0).to_vec()))
        } else {
            Ok(None)
        }
    }

    /// Drain an application-to-control-system variable, returning every
    /// queued value vector in FIFO order.
    pub fn receive_all<T: UserValue + TypedAccessorExt>(
        &self,
        public_name: &str,
    ) -> RuntimeResult<Vec<Vec<T>>> {
        let mut values = Vec::new();
        while let Some(value) = self.receive::<T>(public_name)? {
            values.push(value);
        }
        Ok(values)
    }
}

impl ControlSystemAdapter for TestAdapter {
    fn create_process_array(
        &self,
        direction: SyncDirection,
        public_name: &str,
        value_type: ValueType,
        n_elements: usize,
        _unit: &str,
        _description: &str,
        variable_id: VariableId,
    ) -> TransportResult<AnyAccessor> {
        let mut state = self.lock();
        let (far_end, app_end) = dispatch_value_type!(value_type, |U| {
            let (sender, receiver) =
                transport_pair::<U>(public_name, 1, n_elements, self.queue_depth, variable_id);
            match direction {
                SyncDirection::ControlSystemToDevice => (
                    U::into_any(Box::new(sender)),
                    U::into_any(Box::new(receiver)),
                ),
                SyncDirection::DeviceToControlSystem => (
                    U::into_any(Box::new(receiver)),
                    U::into_any(Box::new(sender)),
                ),
            }
        });
        state.vars.insert(
            public_name.to_string(),
            TestVariable {
                far_end,
                variable_id,
                direction,
            },
        );
        Ok(app_end)
    }

    fn attach_testable_gate(&self, gate: Arc<TestableGate>) {
        self.lock().gate = Some(gate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_register_serves_the_scripted_sequence() {
        let backend = MemoryBackend::new();
        backend.set_sequence("/ADC/raw", &[1.0, 2.0, 3.0]);
        let any = backend
            .register_accessor("/ADC/raw", ValueType::Int16, 2, false, VariableId::new(0))
            .unwrap();
        let mut register = i16::into_typed(any).unwrap();
        for expected in [1_i16, 2, 3, 3] {
            register.read().unwrap();
            assert_eq!(register.buffer().channel(0), &[expected, expected]);
        }
        assert_eq!(backend.read_count("/ADC/raw"), 4);
    }

    #[test]
    fn writes_are_recorded() {
        let backend = MemoryBackend::new();
        let any = backend
            .register_accessor("/DAC/out", ValueType::Float64, 1, false, VariableId::new(0))
            .unwrap();
        let mut register = f64::into_typed(any).unwrap();
        register.buffer_mut().set_value(2.5).unwrap();
        register.write().unwrap();
        assert_eq!(backend.written("/DAC/out"), vec![vec![2.5]]);
    }

    #[test]
    fn push_register_delivers_queued_values() {
        let backend = MemoryBackend::new();
        let any = backend
            .register_accessor("/events", ValueType::UInt32, 1, true, VariableId::new(0))
            .unwrap();
        let mut register = u32::into_typed(any).unwrap();
        backend.push_value("/events", 7.0).unwrap();
        register.read().unwrap();
        assert_eq!(register.buffer().value(), Some(&7));
        assert!(!register.read_non_blocking().unwrap());
    }

    #[test]
    fn adapter_round_trip_by_public_name() {
        let adapter = TestAdapter::new();
        let app_in = adapter
            .create_process_array(
                SyncDirection::ControlSystemToDevice,
                "/setpoint",
                ValueType::Float32,
                1,
                "V",
                "",
                VariableId::new(0),
            )
            .unwrap();
        let mut app_in = f32::into_typed(app_in).unwrap();
        adapter.feed("/setpoint", &[1.5_f32]).unwrap();
        app_in.read().unwrap();
        assert_eq!(app_in.buffer().value(), Some(&1.5));

        let app_out = adapter
            .create_process_array(
                SyncDirection::DeviceToControlSystem,
                "/reading",
                ValueType::Float32,
                1,
                "",
                "",
                VariableId::new(1),
            )
            .unwrap();
        let mut app_out = f32::into_typed(app_out).unwrap();
        app_out.buffer_mut().set_value(4.0).unwrap();
        app_out.write().unwrap();
        assert_eq!(adapter.receive::<f32>("/reading").unwrap(), Some(vec![4.0]));
        assert_eq!(adapter.receive::<f32>("/reading").unwrap(), None);
    }
}
