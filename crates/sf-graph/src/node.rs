//! Endpoint records of the variable graph.

use serde::{Deserialize, Serialize};
use sf_core::{ConstantValue, ModuleId, NetworkId, NodeId, ValueType};

/// Which side of a network an endpoint is on.
///
/// Device and control-system endpoints are declared `Unresolved`; they take
/// the feeding side if their network has no feeder yet, the consuming side
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeDirection {
    Feeding,
    Consuming,
    Unresolved,
}

/// Whether new values arrive spontaneously or must be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    Push,
    Poll,
}

/// Kind-specific data of an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A variable owned by an application module.
    Application {
        module: ModuleId,
        name: String,
        unit: String,
        description: String,
    },
    /// A hardware device register.
    Device {
        alias: String,
        register_path: String,
    },
    /// A variable exported through the control-system adapter.
    ControlSystem { public_name: String },
    /// A fixed value.
    Constant { value: ConstantValue },
    /// Receives the ticks of a trigger network on behalf of `target`.
    TriggerReceiver { target: NodeId },
}

impl NodeKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::Application { .. } => "Application",
            NodeKind::Device { .. } => "Device",
            NodeKind::ControlSystem { .. } => "ControlSystem",
            NodeKind::Constant { .. } => "Constant",
            NodeKind::TriggerReceiver { .. } => "TriggerReceiver",
        }
    }
}

/// A declared endpoint of a variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub direction: NodeDirection,
    pub mode: UpdateMode,
    /// `None` is the declaration-time wildcard, unified away before freezing.
    pub value_type: Option<ValueType>,
    /// 0 means "inherit from the peer".
    pub n_elements: usize,
    /// The network this node belongs to, once connected.
    pub network: Option<NetworkId>,
    /// External trigger feeder driving this node's transfers.
    pub trigger: Option<NodeId>,
}

impl VariableNode {
    pub fn is_application(&self) -> bool {
        matches!(self.kind, NodeKind::Application { .. })
    }

    pub fn is_trigger_receiver(&self) -> bool {
        matches!(self.kind, NodeKind::TriggerReceiver { .. })
    }

    /// Whether resolution derives a fixed implementation from this node
    /// (device register or control-system variable).
    pub fn has_fixed_implementation(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Device { .. } | NodeKind::ControlSystem { .. }
        )
    }

    /// One-line description used in diagnostics and dumps.
    pub fn describe(&self) -> String {
        let ty = self
            .value_type
            .map_or_else(|| "any".to_string(), |t| t.to_string());
        let detail = match &self.kind {
            NodeKind::Application { name, .. } => name.clone(),
            NodeKind::Device {
                alias,
                register_path,
            } => format!("{alias}:{register_path}"),
            NodeKind::ControlSystem { public_name } => public_name.clone(),
            NodeKind::Constant { value } => format!("{value:?}"),
            NodeKind::TriggerReceiver { target } => format!("-> node {target}"),
        };
        format!(
            "{} '{}' [{:?} {:?} {} x{}]",
            self.kind.kind_name(),
            detail,
            self.direction,
            self.mode,
            ty,
            self.n_elements
        )
    }
}
