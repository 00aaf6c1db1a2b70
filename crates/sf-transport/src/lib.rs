//! sf-transport: value transport and accessor contracts for signalflow.
//!
//! Provides:
//! - the synchronized transport pair (bounded queue, version stamps)
//! - the uniform accessor contract shared by device registers,
//!   control-system variables, transport pair ends and constants
//! - constant accessors and the debug/testable decorators
//! - the testable-mode gate (cooperative lock + per-variable counters)
//! - the contracts consumed from device backends and control-system adapters

pub mod backend;
pub mod constant;
pub mod debug;
pub mod element;
pub mod error;
pub mod pair;
pub mod testable;

// Re-exports for ergonomics
pub use backend::{AnyAccessor, ControlSystemAdapter, DeviceBackend, SyncDirection, TypedAccessorExt};
pub use constant::ConstantAccessor;
pub use debug::DebugAccessor;
pub use element::{AccessorDescriptor, Interrupter, SyncAccessor};
pub use error::{TransportError, TransportResult};
pub use pair::{transport_pair, ConsumingEnd, FeedingEnd};
pub use testable::{QueueProbe, TestableAccessor, TestableGate};
