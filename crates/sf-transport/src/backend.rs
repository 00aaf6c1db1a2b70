//! Contracts consumed from the device layer and the control-system adapter.
//!
//! Accessors cross these seams type-erased as [`AnyAccessor`], a tagged
//! bundle over the closed user type set. Generic code recovers the typed
//! box through [`TypedAccessorExt`]; there is no dynamic downcasting.

use std::sync::Arc;

use sf_core::{UserValue, ValueType, VariableId};
use serde::{Deserialize, Serialize};

use crate::element::{Interrupter, SyncAccessor};
use crate::error::TransportResult;
use crate::testable::TestableGate;

/// Which way a control-system variable synchronises. "Device" is the
/// application side of the adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    ControlSystemToDevice,
    DeviceToControlSystem,
}

/// Conversions between a typed accessor box and the tagged bundle.
pub trait TypedAccessorExt: UserValue {
    fn into_typed(any: AnyAccessor) -> Option<Box<dyn SyncAccessor<Self>>>;
    fn typed_mut(any: &mut AnyAccessor) -> Option<&mut Box<dyn SyncAccessor<Self>>>;
    fn into_any(accessor: Box<dyn SyncAccessor<Self>>) -> AnyAccessor;
}

macro_rules! impl_any_accessor {
    ($($rust:ty => $variant:ident),* $(,)?) => {
        /// A type-erased accessor, tagged with its user type.
        pub enum AnyAccessor {
            $($variant(Box<dyn SyncAccessor<$rust>>),)*
        }

        impl AnyAccessor {
            pub fn value_type(&self) -> ValueType {
                match self {
                    $(Self::$variant(_) => ValueType::$variant,)*
                }
            }

            pub fn variable_id(&self) -> VariableId {
                match self {
                    $(Self::$variant(a) => a.variable_id(),)*
                }
            }

            pub fn interrupter(&self) -> Option<Arc<dyn Interrupter>> {
                match self {
                    $(Self::$variant(a) => a.interrupter(),)*
                }
            }

            pub fn queue_probe(&self) -> Option<Arc<dyn crate::testable::QueueProbe>> {
                match self {
                    $(Self::$variant(a) => a.queue_probe(),)*
                }
            }
        }

        $(
            impl TypedAccessorExt for $rust {
                fn into_typed(any: AnyAccessor) -> Option<Box<dyn SyncAccessor<Self>>> {
                    match any {
                        AnyAccessor::$variant(a) => Some(a),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn typed_mut(any: &mut AnyAccessor) -> Option<&mut Box<dyn SyncAccessor<Self>>> {
                    match any {
                        AnyAccessor::$variant(a) => Some(a),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn into_any(accessor: Box<dyn SyncAccessor<Self>>) -> AnyAccessor {
                    AnyAccessor::$variant(accessor)
                }
            }
        )*
    };
}

impl_any_accessor!(
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

/// Contract of the hardware device layer.
///
/// Backends hand out typed register accessors by path. With
/// `wait_for_new_data` the register's blocking read waits for the device to
/// push a new value; without it reads poll the current register content.
pub trait DeviceBackend: Send + Sync {
    fn open(&self) -> TransportResult<()>;

    fn is_open(&self) -> bool;

    fn register_accessor(
        &self,
        register_path: &str,
        value_type: ValueType,
        n_elements: usize,
        wait_for_new_data: bool,
        variable_id: VariableId,
    ) -> TransportResult<AnyAccessor>;
}

/// Contract of the control-system adapter.
///
/// The adapter exports process arrays by public name; the returned accessor
/// is the application-facing end and has a stable identity.
pub trait ControlSystemAdapter: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn create_process_array(
        &self,
        direction: SyncDirection,
        public_name: &str,
        value_type: ValueType,
        n_elements: usize,
        unit: &str,
        description: &str,
        variable_id: VariableId,
    ) -> TransportResult<AnyAccessor>;

    /// Called once by the application when testable mode is enabled, so the
    /// adapter's far ends can participate in counting and gate hand-over.
    fn attach_testable_gate(&self, _gate: Arc<TestableGate>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::ConstantAccessor;

    #[test]
    fn any_accessor_round_trip() {
        let acc = ConstantAccessor::new(4_i32, 1, VariableId::new(3));
        let any = i32::into_any(Box::new(acc));
        assert_eq!(any.value_type(), ValueType::Int32);
        assert_eq!(any.variable_id(), VariableId::new(3));
        assert!(i16::into_typed(any).is_none());
    }
}
