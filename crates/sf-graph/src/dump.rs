//! Human-readable and Graphviz dumps of the declared connections.

use sf_core::NodeId;

use crate::graph::ConnectionGraph;
use crate::module::ModuleTree;
use crate::node::{NodeKind, VariableNode};

fn node_label(node: &VariableNode, tree: &ModuleTree) -> String {
    match &node.kind {
        NodeKind::Application { module, name, .. } => {
            tree.qualified_variable_name(*module, name)
        }
        NodeKind::Device {
            alias,
            register_path,
        } => format!("Device:{alias}{register_path}"),
        NodeKind::ControlSystem { public_name } => format!("CS:{public_name}"),
        NodeKind::Constant { value } => format!("Constant({value:?})"),
        NodeKind::TriggerReceiver { target } => format!("TriggerReceiver(node {target})"),
    }
}

/// Listing of all variable connections, one block per network.
pub fn dump_connections(graph: &ConnectionGraph, tree: &ModuleTree) -> String {
    let mut out =
        String::from("==== List of all variable connections of the application ====\n");
    for network in graph.networks() {
        out.push_str(&format!(
            "network {} (type {}, {} elements):\n",
            network.id,
            network
                .value_type
                .map_or_else(|| "unresolved".to_string(), |t| t.to_string()),
            network.n_elements
        ));
        for &node_id in &network.nodes {
            let node = graph.node(node_id);
            let role = if Some(node_id) == network.feeder {
                "feeder  "
            } else {
                "consumer"
            };
            out.push_str(&format!("  {} {}\n", role, node_label(node, tree)));
        }
    }
    out.push_str("==============================================================\n");
    out
}

/// Graphviz rendering of the connection graph: one edge per feeder-consumer
/// relation, nodes labelled by their qualified names.
pub fn connection_graph_dot(graph: &ConnectionGraph, tree: &ModuleTree) -> String {
    let mut out = String::from("digraph connections {\n  rankdir=LR;\n");

    let dot_id = |id: NodeId| format!("n{}", id.index());
    let mut emitted: Vec<NodeId> = Vec::new();
    let mut emit_node = |out: &mut String, id: NodeId| {
        if emitted.contains(&id) {
            return;
        }
        emitted.push(id);
        let node = graph.node(id);
        let shape = match node.kind {
            NodeKind::Application { .. } => "box",
            NodeKind::Device { .. } => "component",
            NodeKind::ControlSystem { .. } => "ellipse",
            NodeKind::Constant { .. } => "plaintext",
            NodeKind::TriggerReceiver { .. } => "diamond",
        };
        out.push_str(&format!(
            "  {} [label=\"{}\" shape={}];\n",
            dot_id(id),
            node_label(node, tree),
            shape
        ));
    };

    for network in graph.networks() {
        let Some(feeder) = network.feeder else { continue };
        emit_node(&mut out, feeder);
        for consumer in network.consumers() {
            emit_node(&mut out, consumer);
            let style = if graph.node(consumer).is_trigger_receiver() {
                " [style=dashed]"
            } else {
                ""
            };
            out.push_str(&format!(
                "  {} -> {}{};\n",
                dot_id(feeder),
                dot_id(consumer),
                style
            ));
        }
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeDirection, UpdateMode};
    use sf_core::ValueType;

    #[test]
    fn dot_output_contains_all_endpoints() {
        let mut tree = ModuleTree::new("app").unwrap();
        let module = tree.add_module(tree.root(), "ctrl", "").unwrap();
        let mut graph = ConnectionGraph::new();
        let out_node = graph.add_node(
            NodeKind::Application {
                module,
                name: "x".into(),
                unit: String::new(),
                description: String::new(),
            },
            NodeDirection::Feeding,
            UpdateMode::Push,
            Some(ValueType::Int32),
            1,
        );
        let cs_node = graph.add_node(
            NodeKind::ControlSystem {
                public_name: "/x".into(),
            },
            NodeDirection::Unresolved,
            UpdateMode::Push,
            None,
            0,
        );
        graph.connect(out_node, cs_node).unwrap();

        let dot = connection_graph_dot(&graph, &tree);
        assert!(dot.contains("/app/ctrl/x"));
        assert!(dot.contains("CS:/x"));
        assert!(dot.contains("->"));

        let listing = dump_connections(&graph, &tree);
        assert!(listing.contains("feeder"));
        assert!(listing.contains("consumer"));
    }
}
