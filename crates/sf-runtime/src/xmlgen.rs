//! The exported variable list and its XML rendering.
//!
//! The list is keyed by public name and sorted, so the artefact is stable
//! across runs given the same declaration.

use serde::Serialize;

use sf_core::ValueType;
use sf_graph::{ConnectionGraph, NodeDirection, NodeKind};
use sf_transport::SyncDirection;

use crate::error::{RuntimeError, RuntimeResult};

/// One exported control-system variable.
#[derive(Debug, Clone, Serialize)]
pub struct VariableListEntry {
    pub name: String,
    pub value_type: ValueType,
    pub direction: SyncDirection,
    pub n_elements: usize,
    pub unit: String,
    pub description: String,
}

/// Collect all control-system endpoints of the graph into sorted records.
pub(crate) fn variable_list(graph: &ConnectionGraph) -> RuntimeResult<Vec<VariableListEntry>> {
    let mut entries = Vec::new();
    for node in graph.nodes() {
        let NodeKind::ControlSystem { public_name } = &node.kind else {
            continue;
        };
        let Some(network_id) = node.network else {
            continue;
        };
        let network = graph.network(network_id);
        let value_type = node.value_type.or(network.value_type).ok_or_else(|| {
            RuntimeError::IllegalParameter {
                what: format!("exported variable '{public_name}' has no resolved value type"),
            }
        })?;
        let direction = if node.direction == NodeDirection::Feeding {
            SyncDirection::ControlSystemToDevice
        } else {
            SyncDirection::DeviceToControlSystem
        };
        let n_elements = if node.n_elements != 0 {
            node.n_elements
        } else {
            network.n_elements.max(1)
        };
        let (unit, description) = network
            .nodes
            .iter()
            .find_map(|&id| match &graph.node(id).kind {
                NodeKind::Application {
                    unit, description, ..
                } => Some((unit.clone(), description.clone())),
                _ => None,
            })
            .unwrap_or_default();
        entries.push(VariableListEntry {
            name: public_name.clone(),
            value_type,
            direction,
            n_elements,
            unit,
            description,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render the variable list as XML.
pub(crate) fn render_xml(application_name: &str, entries: &[VariableListEntry]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<variables application=\"{}\">\n",
        escape(application_name)
    ));
    for entry in entries {
        let direction = match entry.direction {
            SyncDirection::ControlSystemToDevice => "control_system_to_application",
            SyncDirection::DeviceToControlSystem => "application_to_control_system",
        };
        out.push_str(&format!(
            "  <variable name=\"{}\" type=\"{}\" direction=\"{}\" elements=\"{}\" \
             unit=\"{}\" description=\"{}\"/>\n",
            escape(&entry.name),
            entry.value_type.name(),
            direction,
            entry.n_elements,
            escape(&entry.unit),
            escape(&entry.description),
        ));
    }
    out.push_str("</variables>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_escapes_special_characters() {
        assert_eq!(escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn rendering_is_sorted_and_stable() {
        let entries = vec![
            VariableListEntry {
                name: "/a".into(),
                value_type: ValueType::Int32,
                direction: SyncDirection::ControlSystemToDevice,
                n_elements: 1,
                unit: "V".into(),
                description: "input".into(),
            },
            VariableListEntry {
                name: "/b".into(),
                value_type: ValueType::Float64,
                direction: SyncDirection::DeviceToControlSystem,
                n_elements: 4,
                unit: String::new(),
                description: String::new(),
            },
        ];
        let xml = render_xml("app", &entries);
        assert!(xml.contains("<variables application=\"app\">"));
        assert!(xml.contains(
            "<variable name=\"/a\" type=\"int32\" direction=\"control_system_to_application\""
        ));
        assert!(xml.contains("type=\"float64\""));
        assert!(xml.ends_with("</variables>\n"));
    }
}
