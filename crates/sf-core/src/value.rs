//! The closed user value type set and type-tag dispatch.
//!
//! Every concrete accessor in the runtime is parameterised over exactly one
//! member of this set. Declarations may leave the type open (`None` standing
//! for the wildcard); the wildcard is unified away before the graph freezes.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Tag for one member of the closed user type set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Boolean,
}

impl ValueType {
    /// Stable lowercase name, used for exported variable lists and dumps.
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Int8 => "int8",
            ValueType::Int16 => "int16",
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::UInt8 => "uint8",
            ValueType::UInt16 => "uint16",
            ValueType::UInt32 => "uint32",
            ValueType::UInt64 => "uint64",
            ValueType::Float32 => "float32",
            ValueType::Float64 => "float64",
            ValueType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single constant value, tagged with its user type.
///
/// Constant endpoints hold a scalar which is replicated to the element count
/// of the network they feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstantValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Boolean(bool),
}

impl ConstantValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ConstantValue::Int8(_) => ValueType::Int8,
            ConstantValue::Int16(_) => ValueType::Int16,
            ConstantValue::Int32(_) => ValueType::Int32,
            ConstantValue::Int64(_) => ValueType::Int64,
            ConstantValue::UInt8(_) => ValueType::UInt8,
            ConstantValue::UInt16(_) => ValueType::UInt16,
            ConstantValue::UInt32(_) => ValueType::UInt32,
            ConstantValue::UInt64(_) => ValueType::UInt64,
            ConstantValue::Float32(_) => ValueType::Float32,
            ConstantValue::Float64(_) => ValueType::Float64,
            ConstantValue::Boolean(_) => ValueType::Boolean,
        }
    }

    /// The zero (default) constant of the given type, used for nodes left
    /// unconnected after the declaration phase.
    pub fn zero_of(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Int8 => ConstantValue::Int8(0),
            ValueType::Int16 => ConstantValue::Int16(0),
            ValueType::Int32 => ConstantValue::Int32(0),
            ValueType::Int64 => ConstantValue::Int64(0),
            ValueType::UInt8 => ConstantValue::UInt8(0),
            ValueType::UInt16 => ConstantValue::UInt16(0),
            ValueType::UInt32 => ConstantValue::UInt32(0),
            ValueType::UInt64 => ConstantValue::UInt64(0),
            ValueType::Float32 => ConstantValue::Float32(0.0),
            ValueType::Float64 => ConstantValue::Float64(0.0),
            ValueType::Boolean => ConstantValue::Boolean(false),
        }
    }
}

/// One member of the closed user type set.
///
/// Implemented exactly for the eleven types named by [`ValueType`]; the
/// runtime never deals with values outside this set.
pub trait UserValue:
    Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static
{
    const VALUE_TYPE: ValueType;

    /// Extract a typed value from a tagged constant; `None` on tag mismatch.
    fn from_constant(value: &ConstantValue) -> Option<Self>;

    fn to_constant(&self) -> ConstantValue;

    /// Lossy numeric conversions for scripted test fixtures.
    fn from_f64(value: f64) -> Self;
    fn to_f64(&self) -> f64;
}

macro_rules! impl_user_value {
    ($($rust:ty => $variant:ident),* $(,)?) => {
        $(
            impl UserValue for $rust {
                const VALUE_TYPE: ValueType = ValueType::$variant;

                fn from_constant(value: &ConstantValue) -> Option<Self> {
                    match value {
                        ConstantValue::$variant(v) => Some(*v),
                        _ => None,
                    }
                }

                fn to_constant(&self) -> ConstantValue {
                    ConstantValue::$variant(*self)
                }

                fn from_f64(value: f64) -> Self {
                    value as $rust
                }

                fn to_f64(&self) -> f64 {
                    *self as f64
                }
            }
        )*
    };
}

impl_user_value!(
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
);

impl UserValue for bool {
    const VALUE_TYPE: ValueType = ValueType::Boolean;

    fn from_constant(value: &ConstantValue) -> Option<Self> {
        match value {
            ConstantValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    fn to_constant(&self) -> ConstantValue {
        ConstantValue::Boolean(*self)
    }

    fn from_f64(value: f64) -> Self {
        value != 0.0
    }

    fn to_f64(&self) -> f64 {
        if *self { 1.0 } else { 0.0 }
    }
}

/// Dispatch a [`ValueType`] tag to a generic code path.
///
/// Expands to a `match` over the closed type set; `$T` is bound to the
/// concrete Rust type in each arm. This replaces dynamic downcasting for all
/// type-indexed resolution steps:
///
/// ```
/// use sf_core::{dispatch_value_type, ValueType};
///
/// fn size_of(vt: ValueType) -> usize {
///     dispatch_value_type!(vt, |T| std::mem::size_of::<T>())
/// }
/// assert_eq!(size_of(ValueType::Int32), 4);
/// ```
#[macro_export]
macro_rules! dispatch_value_type {
    ($vt:expr, |$T:ident| $body:expr) => {
        match $vt {
            $crate::value::ValueType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::value::ValueType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::value::ValueType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::value::ValueType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::value::ValueType::UInt8 => {
                type $T = u8;
                $body
            }
            $crate::value::ValueType::UInt16 => {
                type $T = u16;
                $body
            }
            $crate::value::ValueType::UInt32 => {
                type $T = u32;
                $body
            }
            $crate::value::ValueType::UInt64 => {
                type $T = u64;
                $body
            }
            $crate::value::ValueType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::value::ValueType::Float64 => {
                type $T = f64;
                $body
            }
            $crate::value::ValueType::Boolean => {
                type $T = bool;
                $body
            }
        }
    };
}
