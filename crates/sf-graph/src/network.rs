//! Network records: one feeder, many consumers.

use sf_core::{NetworkId, NodeId, ValueType};

/// A set of connected endpoints sharing one value stream.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableNetwork {
    pub id: NetworkId,
    /// All member nodes; the feeder is also in this list.
    pub nodes: Vec<NodeId>,
    pub feeder: Option<NodeId>,
    /// Resolved user type; `None` until unification completes.
    pub value_type: Option<ValueType>,
    /// Resolved element count; 0 until unification completes.
    pub n_elements: usize,
    /// Merged away by the optimisation pass; skipped everywhere.
    pub dissolved: bool,
    /// Set once the resolver has allocated transports for this network.
    pub created: bool,
}

impl VariableNetwork {
    pub fn new(id: NetworkId) -> Self {
        Self {
            id,
            nodes: Vec::new(),
            feeder: None,
            value_type: None,
            n_elements: 0,
            dissolved: false,
            created: false,
        }
    }

    /// All member nodes except the feeder.
    pub fn consumers(&self) -> impl Iterator<Item = NodeId> + '_ {
        let feeder = self.feeder;
        self.nodes.iter().copied().filter(move |n| Some(*n) != feeder)
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers().count()
    }
}
