//! User-visible variable handles.
//!
//! A handle is a thin front-end over a pluggable back-end slot. Handles are
//! created during the declaration phase and moved into the module worker;
//! the resolver later installs the concrete accessor into the shared slot.
//! User code keeps its handle across resolution.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sf_core::{NodeId, UserValue, VersionNumber};
use sf_transport::{SyncAccessor, TransportError, TypedAccessorExt};

use crate::error::{RuntimeError, RuntimeResult};

/// The pluggable back-end of one application variable.
///
/// Empty until the resolver installs the concrete accessor; the mutex only
/// serialises that installation hand-over, at runtime the owning module
/// thread is the sole user.
pub struct AccessorSlot<T: UserValue> {
    backend: Mutex<Option<Box<dyn SyncAccessor<T>>>>,
}

impl<T: UserValue> AccessorSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            backend: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn SyncAccessor<T>>>> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn install(&self, accessor: Box<dyn SyncAccessor<T>>) {
        *self.lock() = Some(accessor);
    }

    fn with<R>(&self, f: impl FnOnce(&mut dyn SyncAccessor<T>) -> R) -> RuntimeResult<R> {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(accessor) => Ok(f(accessor.as_mut())),
            None => Err(TransportError::LogicError {
                what: "variable used before the application was initialised".to_string(),
            }
            .into()),
        }
    }
}

/// Reading side of an application variable.
pub struct InputHandle<T: UserValue> {
    node: NodeId,
    slot: Arc<AccessorSlot<T>>,
}

impl<T: UserValue> InputHandle<T> {
    pub(crate) fn new(node: NodeId, slot: Arc<AccessorSlot<T>>) -> Self {
        Self { node, slot }
    }

    /// The graph endpoint behind this handle, for `connect()`.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Blocking read: waits for a new value (push) or performs the
    /// underlying transfer (poll).
    pub fn read(&self) -> RuntimeResult<()> {
        self.slot.with(|a| a.read())?.map_err(Into::into)
    }

    /// Returns whether a new value was consumed, without blocking.
    pub fn read_non_blocking(&self) -> RuntimeResult<bool> {
        self.slot.with(|a| a.read_non_blocking())?.map_err(Into::into)
    }

    /// Drain the queue keeping only the most recent value.
    pub fn read_latest(&self) -> RuntimeResult<bool> {
        self.slot.with(|a| a.read_latest())?.map_err(Into::into)
    }

    /// The first element of the current value.
    pub fn value(&self) -> RuntimeResult<T> {
        self.slot
            .with(|a| a.buffer().value().cloned())?
            .ok_or_else(|| {
                RuntimeError::from(TransportError::LogicError {
                    what: "variable buffer is empty".to_string(),
                })
            })
    }

    /// The current value vector.
    pub fn values(&self) -> RuntimeResult<Vec<T>> {
        self.slot.with(|a| a.buffer().channel(0).to_vec())
    }

    /// Version of the last value seen.
    pub fn version(&self) -> RuntimeResult<VersionNumber> {
        self.slot.with(|a| a.version())
    }
}

/// Writing side of an application variable.
pub struct OutputHandle<T: UserValue> {
    node: NodeId,
    slot: Arc<AccessorSlot<T>>,
}

impl<T: UserValue> OutputHandle<T> {
    pub(crate) fn new(node: NodeId, slot: Arc<AccessorSlot<T>>) -> Self {
        Self { node, slot }
    }

    /// The graph endpoint behind this handle, for `connect()`.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Set the first element of the staged value.
    pub fn set(&self, value: T) -> RuntimeResult<()> {
        self.slot
            .with(|a| a.buffer_mut().set_value(value))?
            .map_err(Into::into)
    }

    /// Set the full staged value vector.
    pub fn set_all(&self, values: &[T]) -> RuntimeResult<()> {
        self.slot.with(|a| {
            let channel = a.buffer_mut().channel_mut(0);
            if channel.len() != values.len() {
                return Err(RuntimeError::IllegalParameter {
                    what: format!(
                        "value vector has {} elements, variable holds {}",
                        values.len(),
                        channel.len()
                    ),
                });
            }
            channel.clone_from_slice(values);
            Ok(())
        })?
    }

    /// The currently staged value vector (still observable after a write).
    pub fn values(&self) -> RuntimeResult<Vec<T>> {
        self.slot.with(|a| a.buffer().channel(0).to_vec())
    }

    /// Send the staged value; returns `true` iff a pending value was
    /// dropped downstream.
    pub fn write(&self) -> RuntimeResult<bool> {
        self.slot.with(|a| a.write())?.map_err(Into::into)
    }

    /// Convenience: set the first element and send.
    pub fn write_value(&self, value: T) -> RuntimeResult<bool> {
        self.set(value)?;
        self.write()
    }
}

/// Participant of [`Application::read_any`](crate::Application::read_any).
pub trait PendingRead {
    /// Consume one pending value if available.
    fn try_consume(&mut self) -> RuntimeResult<bool>;
}

impl<T: UserValue> PendingRead for InputHandle<T> {
    fn try_consume(&mut self) -> RuntimeResult<bool> {
        self.read_non_blocking()
    }
}

/// The closed set of user types as the resolver sees application slots.
///
/// Implemented for exactly the eleven user value types; the methods are an
/// implementation detail of the slot registry.
pub trait RuntimeValue: UserValue + TypedAccessorExt {
    #[doc(hidden)]
    fn wrap_slot(slot: Arc<AccessorSlot<Self>>) -> TypedSlot;
    #[doc(hidden)]
    fn typed_slot(slot: &TypedSlot) -> Option<Arc<AccessorSlot<Self>>>;
}

macro_rules! impl_runtime_value {
    ($($rust:ty => $variant:ident),* $(,)?) => {
        /// Type-erased slot registry entry, tagged with its user type.
        #[doc(hidden)]
        pub enum TypedSlot {
            $($variant(Arc<AccessorSlot<$rust>>),)*
        }

        impl TypedSlot {
            /// Drain the installed accessor to its most recent value, used
            /// for the startup sweep over consuming variables.
            pub(crate) fn read_latest_installed(&self) -> RuntimeResult<bool> {
                match self {
                    $(Self::$variant(slot) => {
                        slot.with(|a| a.read_latest())?.map_err(Into::into)
                    })*
                }
            }
        }

        $(
            impl RuntimeValue for $rust {
                fn wrap_slot(slot: Arc<AccessorSlot<$rust>>) -> TypedSlot {
                    TypedSlot::$variant(slot)
                }

                fn typed_slot(slot: &TypedSlot) -> Option<Arc<AccessorSlot<$rust>>> {
                    match slot {
                        TypedSlot::$variant(s) => Some(Arc::clone(s)),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_runtime_value!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    bool => Boolean,
);

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::VariableId;
    use sf_transport::transport_pair;

    #[test]
    fn handle_before_initialise_is_a_logic_error() {
        let slot = Arc::new(AccessorSlot::<i32>::new());
        let handle = InputHandle::new(NodeId::from_index(0), slot);
        assert!(matches!(
            handle.read_non_blocking(),
            Err(RuntimeError::Transport(TransportError::LogicError { .. }))
        ));
    }

    #[test]
    fn handles_drive_an_installed_pair() {
        let (tx, rx) = transport_pair::<i32>("x", 1, 1, 3, VariableId::new(0));
        let out_slot = Arc::new(AccessorSlot::new());
        let in_slot = Arc::new(AccessorSlot::new());
        out_slot.install(Box::new(tx));
        in_slot.install(Box::new(rx));

        let out = OutputHandle::new(NodeId::from_index(0), out_slot);
        let inp = InputHandle::new(NodeId::from_index(1), in_slot);

        out.write_value(11).unwrap();
        inp.read().unwrap();
        assert_eq!(inp.value().unwrap(), 11);
    }

    #[test]
    fn typed_slot_round_trip() {
        let slot = Arc::new(AccessorSlot::<f32>::new());
        let typed = f32::wrap_slot(Arc::clone(&slot));
        assert!(f32::typed_slot(&typed).is_some());
        assert!(f64::typed_slot(&typed).is_none());
    }
}
