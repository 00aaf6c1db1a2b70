//! sf-graph: the declared variable graph of a signalflow application.
//!
//! Provides:
//! - endpoint and network records (`VariableNode`, `VariableNetwork`)
//! - the arena-style `ConnectionGraph` owner with `connect()` unification,
//!   the unconnected-node sweep and the device-feeder optimisation pass
//! - the module owner tree with hierarchy elimination
//! - human-readable and Graphviz dumps of the declared connections
//!
//! The graph is mutable during the declaration phase only; the runtime
//! freezes it with `check()` before resolving it into concrete transports.

pub mod dump;
pub mod error;
pub mod graph;
pub mod module;
pub mod network;
pub mod node;

// Re-exports for ergonomics
pub use error::{GraphError, GraphResult};
pub use graph::ConnectionGraph;
pub use module::{ModuleEntry, ModuleKind, ModuleTree};
pub use network::VariableNetwork;
pub use node::{NodeDirection, NodeKind, UpdateMode, VariableNode};
