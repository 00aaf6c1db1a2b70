//! The arena owner of nodes and networks, and the declaration algorithms.

use sf_core::{ConstantValue, NetworkId, NodeId, ValueType};

use crate::error::{GraphError, GraphResult};
use crate::network::VariableNetwork;
use crate::node::{NodeDirection, NodeKind, UpdateMode, VariableNode};

/// Owns every declared endpoint and network.
///
/// All cross-references are ids into the two arenas; nothing holds raw
/// references, so the graph can be mutated freely during the declaration
/// phase. Networks are never removed: the optimisation pass marks merged
/// networks `dissolved` and every traversal skips them.
#[derive(Debug, Default)]
pub struct ConnectionGraph {
    nodes: Vec<VariableNode>,
    networks: Vec<VariableNetwork>,
}

impl ConnectionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an endpoint and return its id.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        direction: NodeDirection,
        mode: UpdateMode,
        value_type: Option<ValueType>,
        n_elements: usize,
    ) -> NodeId {
        let id = NodeId::from_index(self.nodes.len() as u32);
        self.nodes.push(VariableNode {
            id,
            kind,
            direction,
            mode,
            value_type,
            n_elements,
            network: None,
            trigger: None,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &VariableNode {
        &self.nodes[id.index() as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut VariableNode {
        &mut self.nodes[id.index() as usize]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &VariableNode> {
        self.nodes.iter()
    }

    pub fn network(&self, id: NetworkId) -> &VariableNetwork {
        &self.networks[id.index() as usize]
    }

    pub fn network_mut(&mut self, id: NetworkId) -> &mut VariableNetwork {
        &mut self.networks[id.index() as usize]
    }

    /// All live (non-dissolved) networks.
    pub fn networks(&self) -> impl Iterator<Item = &VariableNetwork> {
        self.networks.iter().filter(|n| !n.dissolved)
    }

    pub fn network_ids(&self) -> Vec<NetworkId> {
        self.networks
            .iter()
            .filter(|n| !n.dissolved)
            .map(|n| n.id)
            .collect()
    }

    fn create_network(&mut self) -> NetworkId {
        let id = NetworkId::from_index(self.networks.len() as u32);
        self.networks.push(VariableNetwork::new(id));
        id
    }

    /// Connect two endpoints, merging into an existing network where one is
    /// already connected.
    ///
    /// Unifies the wildcard value type and the "inherit" element count
    /// between the two nodes first; disagreement on either is an error. Two
    /// nodes already living in different networks cannot be connected.
    pub fn connect(&mut self, a: NodeId, b: NodeId) -> GraphResult<NetworkId> {
        if a == b {
            return Err(GraphError::IllegalParameter {
                what: "cannot connect a node to itself".to_string(),
            });
        }

        // unify the value type across the two endpoints
        let ta = self.node(a).value_type;
        let tb = self.node(b).value_type;
        match (ta, tb) {
            (None, Some(t)) => self.node_mut(a).value_type = Some(t),
            (Some(t), None) => self.node_mut(b).value_type = Some(t),
            (Some(x), Some(y)) if x != y => {
                return Err(GraphError::IllegalParameter {
                    what: format!(
                        "cannot connect variables of different value types ({x} vs {y})"
                    ),
                });
            }
            _ => {}
        }

        // unify the element count
        let na = self.node(a).n_elements;
        let nb = self.node(b).n_elements;
        match (na, nb) {
            (0, n) if n != 0 => self.node_mut(a).n_elements = n,
            (n, 0) if n != 0 => self.node_mut(b).n_elements = n,
            (x, y) if x != y => {
                return Err(GraphError::IllegalParameter {
                    what: format!(
                        "cannot connect array variables with different number of elements \
                         ({x} vs {y})"
                    ),
                });
            }
            _ => {}
        }

        match (self.node(a).network, self.node(b).network) {
            (Some(x), Some(y)) if x == y => Ok(x),
            (Some(x), Some(y)) => Err(GraphError::IllegalVariableNetwork {
                what: format!(
                    "nodes to be connected already belong to different networks\n\
                     node A: {}\nnode B: {}\nnetwork of A:\n{}network of B:\n{}",
                    self.node(a).describe(),
                    self.node(b).describe(),
                    self.describe_network(x),
                    self.describe_network(y)
                ),
            }),
            (Some(x), None) => {
                self.add_to_network(b, x)?;
                Ok(x)
            }
            (None, Some(y)) => {
                self.add_to_network(a, y)?;
                Ok(y)
            }
            (None, None) => {
                let network = self.create_network();
                // add an explicitly feeding node first so an unresolved peer
                // lands on the consuming side
                let (first, second) = if self.node(b).direction == NodeDirection::Feeding
                    && self.node(a).direction != NodeDirection::Feeding
                {
                    (b, a)
                } else {
                    (a, b)
                };
                self.add_to_network(first, network)?;
                self.add_to_network(second, network)?;
                Ok(network)
            }
        }
    }

    /// Add a node to a network, unifying type/count and claiming the feeder
    /// side if appropriate.
    fn add_to_network(&mut self, node_id: NodeId, network_id: NetworkId) -> GraphResult<()> {
        // unify value type with the network
        let node_type = self.node(node_id).value_type;
        let net_type = self.network(network_id).value_type;
        match (node_type, net_type) {
            (None, Some(t)) => self.node_mut(node_id).value_type = Some(t),
            (Some(t), None) => self.network_mut(network_id).value_type = Some(t),
            (Some(x), Some(y)) if x != y => {
                return Err(GraphError::IllegalParameter {
                    what: format!(
                        "node {} has value type {x} but its network resolved to {y}",
                        self.node(node_id).describe()
                    ),
                });
            }
            _ => {}
        }

        // unify element count with the network
        let node_count = self.node(node_id).n_elements;
        let net_count = self.network(network_id).n_elements;
        match (node_count, net_count) {
            (0, n) if n != 0 => self.node_mut(node_id).n_elements = n,
            (n, 0) if n != 0 => self.network_mut(network_id).n_elements = n,
            (x, y) if x != y => {
                return Err(GraphError::IllegalParameter {
                    what: format!(
                        "node {} has {x} elements but its network resolved to {y}",
                        self.node(node_id).describe()
                    ),
                });
            }
            _ => {}
        }

        // claim the feeder side
        match self.node(node_id).direction {
            NodeDirection::Feeding => {
                if self.network(network_id).feeder.is_some() {
                    return Err(GraphError::IllegalVariableNetwork {
                        what: format!(
                            "network already has a feeder, cannot add feeding node {}",
                            self.node(node_id).describe()
                        ),
                    });
                }
                self.network_mut(network_id).feeder = Some(node_id);
            }
            NodeDirection::Consuming => {}
            NodeDirection::Unresolved => {
                if self.network(network_id).feeder.is_none() {
                    self.node_mut(node_id).direction = NodeDirection::Feeding;
                    self.network_mut(network_id).feeder = Some(node_id);
                } else {
                    self.node_mut(node_id).direction = NodeDirection::Consuming;
                }
            }
        }

        self.network_mut(network_id).nodes.push(node_id);
        self.node_mut(node_id).network = Some(network_id);
        Ok(())
    }

    /// Let `trigger` drive the transfers of `node`.
    ///
    /// The trigger feeder gains a trigger-receiver consumer in its own
    /// network; that receiver remembers which node it ticks.
    pub fn set_external_trigger(&mut self, node: NodeId, trigger: NodeId) -> GraphResult<()> {
        if self.node(node).trigger.is_some() {
            return Err(GraphError::IllegalParameter {
                what: format!(
                    "node {} already has an external trigger",
                    self.node(node).describe()
                ),
            });
        }
        if self.node(node).mode != UpdateMode::Poll {
            return Err(GraphError::IllegalParameter {
                what: format!(
                    "external triggers only apply to poll-mode nodes, got {}",
                    self.node(node).describe()
                ),
            });
        }
        if matches!(self.node(trigger).kind, NodeKind::Constant { .. }) {
            return Err(GraphError::IllegalVariableNetwork {
                what: "using constants as triggers is not supported".to_string(),
            });
        }

        // the trigger must be (or become) the feeder of its own network
        let trigger_network = match self.node(trigger).network {
            Some(network) => {
                if self.network(network).feeder != Some(trigger) {
                    return Err(GraphError::IllegalVariableNetwork {
                        what: format!(
                            "trigger node {} is not the feeder of its network",
                            self.node(trigger).describe()
                        ),
                    });
                }
                network
            }
            None => {
                let network = self.create_network();
                self.add_to_network(trigger, network)?;
                if self.network(network).feeder != Some(trigger) {
                    return Err(GraphError::IllegalVariableNetwork {
                        what: format!(
                            "trigger node {} cannot feed a network",
                            self.node(trigger).describe()
                        ),
                    });
                }
                network
            }
        };

        let receiver = self.add_node(
            NodeKind::TriggerReceiver { target: node },
            NodeDirection::Consuming,
            UpdateMode::Push,
            self.node(trigger).value_type,
            0,
        );
        self.add_to_network(receiver, trigger_network)?;
        self.node_mut(node).trigger = Some(trigger);
        Ok(())
    }

    /// Attach every unconnected application node to a freshly synthesised
    /// constant of zero. Returns the networks created by the sweep.
    ///
    /// `name_of` renders the qualified variable name for the warning.
    pub fn sweep_unconnected(
        &mut self,
        warn: bool,
        name_of: impl Fn(&VariableNode) -> String,
    ) -> GraphResult<Vec<NetworkId>> {
        let orphans: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.is_application() && n.network.is_none())
            .map(|n| n.id)
            .collect();

        let mut created = Vec::new();
        for node_id in orphans {
            if warn {
                tracing::warn!(
                    variable = %name_of(self.node(node_id)),
                    "variable is not connected; reading will always result in 0, \
                     writing will be ignored"
                );
            }
            let value_type =
                self.node(node_id)
                    .value_type
                    .ok_or_else(|| GraphError::IllegalParameter {
                        what: format!(
                            "cannot synthesise a constant for untyped variable {}",
                            self.node(node_id).describe()
                        ),
                    })?;
            let n_elements = self.node(node_id).n_elements.max(1);

            let network = self.create_network();
            self.add_to_network(node_id, network)?;
            let constant = self.add_node(
                NodeKind::Constant {
                    value: ConstantValue::zero_of(value_type),
                },
                NodeDirection::Unresolved,
                UpdateMode::Push,
                Some(value_type),
                n_elements,
            );
            self.add_to_network(constant, network)?;
            created.push(network);
        }
        Ok(created)
    }

    /// Merge networks whose feeders are the same device register.
    ///
    /// Sound only for device feeders: other feeder kinds share endpoints by
    /// construction, so equal feeders never occur twice. When a merged
    /// network carried a trigger, the now-redundant trigger receiver is
    /// removed from the trigger network.
    pub fn optimise(&mut self) {
        let ids = self.network_ids();
        for (outer_pos, &outer) in ids.iter().enumerate() {
            if self.network(outer).dissolved {
                continue;
            }
            for &inner in &ids[outer_pos + 1..] {
                if self.network(inner).dissolved {
                    continue;
                }
                let (Some(feeder1), Some(feeder2)) =
                    (self.network(outer).feeder, self.network(inner).feeder)
                else {
                    continue;
                };
                if !self.device_feeders_match(feeder1, feeder2) {
                    continue;
                }

                // merge the outer network into the inner one
                let consumers: Vec<NodeId> = self.network(outer).consumers().collect();
                for consumer in consumers {
                    self.node_mut(consumer).network = Some(inner);
                    self.network_mut(inner).nodes.push(consumer);
                }

                // drop the redundant trigger receiver from the trigger network
                if let Some(trigger) = self.node(feeder1).trigger {
                    self.remove_trigger_receiver(trigger, feeder1);
                }

                self.node_mut(feeder1).network = None;
                self.network_mut(outer).dissolved = true;
                break;
            }
        }
    }

    fn device_feeders_match(&self, feeder1: NodeId, feeder2: NodeId) -> bool {
        let (f1, f2) = (self.node(feeder1), self.node(feeder2));
        let (NodeKind::Device {
            alias: alias1,
            register_path: path1,
        }, NodeKind::Device {
            alias: alias2,
            register_path: path2,
        }) = (&f1.kind, &f2.kind)
        else {
            return false;
        };
        alias1 == alias2
            && path1 == path2
            && f1.direction == f2.direction
            && f1.value_type == f2.value_type
            && f1.n_elements == f2.n_elements
            && f1.mode == f2.mode
            && f1.trigger == f2.trigger
    }

    fn remove_trigger_receiver(&mut self, trigger: NodeId, target: NodeId) {
        let Some(trigger_network) = self.node(trigger).network else {
            return;
        };
        let receiver = self.network(trigger_network).nodes.iter().copied().find(|&n| {
            matches!(self.node(n).kind, NodeKind::TriggerReceiver { target: t } if t == target)
        });
        if let Some(receiver) = receiver {
            self.network_mut(trigger_network)
                .nodes
                .retain(|&n| n != receiver);
            self.node_mut(receiver).network = None;
        }
    }

    /// Finalise and validate every live network.
    ///
    /// Propagates the resolved value type and element count to all member
    /// nodes, then enforces the structural invariants: one feeder, at least
    /// one consumer, concrete type, positive element count, and the
    /// poll-mode feeder restriction.
    pub fn check(&mut self) -> GraphResult<()> {
        for network in self.network_ids() {
            self.finalise_network(network)?;
            self.check_network(network)?;
        }
        Ok(())
    }

    fn finalise_network(&mut self, network_id: NetworkId) -> GraphResult<()> {
        let members = self.network(network_id).nodes.clone();

        let mut value_type = self.network(network_id).value_type;
        let mut n_elements = self.network(network_id).n_elements;
        for &member in &members {
            let node = self.node(member);
            match (value_type, node.value_type) {
                (None, Some(t)) => value_type = Some(t),
                (Some(x), Some(y)) if x != y => {
                    return Err(GraphError::IllegalVariableNetwork {
                        what: format!(
                            "network resolved to conflicting value types:\n{}",
                            self.describe_network(network_id)
                        ),
                    });
                }
                _ => {}
            }
            // trigger receivers carry no payload and do not vote on the count
            if !node.is_trigger_receiver() {
                match (n_elements, node.n_elements) {
                    (0, n) if n != 0 => n_elements = n,
                    (x, y) if y != 0 && x != y => {
                        return Err(GraphError::IllegalVariableNetwork {
                            what: format!(
                                "network resolved to conflicting element counts:\n{}",
                                self.describe_network(network_id)
                            ),
                        });
                    }
                    _ => {}
                }
            }
        }

        let network = self.network_mut(network_id);
        network.value_type = value_type;
        network.n_elements = n_elements;
        for member in members {
            let node = self.node_mut(member);
            node.value_type = value_type;
            if !node.is_trigger_receiver() {
                node.n_elements = n_elements;
            }
        }
        Ok(())
    }

    fn check_network(&self, network_id: NetworkId) -> GraphResult<()> {
        let network = self.network(network_id);

        let feeder = network.feeder.ok_or_else(|| GraphError::IllegalVariableNetwork {
            what: format!("network has no feeder:\n{}", self.describe_network(network_id)),
        })?;
        if network.consumer_count() == 0 {
            return Err(GraphError::IllegalVariableNetwork {
                what: format!(
                    "network has no consumers:\n{}",
                    self.describe_network(network_id)
                ),
            });
        }
        if network.value_type.is_none() {
            return Err(GraphError::IllegalVariableNetwork {
                what: format!(
                    "network value type is still unresolved:\n{}",
                    self.describe_network(network_id)
                ),
            });
        }
        if network.n_elements == 0 {
            return Err(GraphError::IllegalVariableNetwork {
                what: format!(
                    "network element count is still unresolved:\n{}",
                    self.describe_network(network_id)
                ),
            });
        }

        let feeder_node = self.node(feeder);
        let is_constant = matches!(feeder_node.kind, NodeKind::Constant { .. });

        // constants never drive trigger receivers
        if is_constant
            && network
                .consumers()
                .any(|c| self.node(c).is_trigger_receiver())
        {
            return Err(GraphError::IllegalVariableNetwork {
                what: "using constants as triggers is not supported".to_string(),
            });
        }

        // a poll-mode feeder cannot push to its consumers by itself: it
        // needs either an external trigger or exactly one polling
        // application consumer to drive the transfers
        if !is_constant && feeder_node.mode == UpdateMode::Poll && feeder_node.trigger.is_none() {
            let app_consumers: Vec<NodeId> = network
                .consumers()
                .filter(|&c| self.node(c).is_application())
                .collect();
            if app_consumers.len() != 1 {
                return Err(GraphError::IllegalVariableNetwork {
                    what: format!(
                        "a poll-mode feeder without a trigger needs exactly one application \
                         consumer, found {}:\n{}",
                        app_consumers.len(),
                        self.describe_network(network_id)
                    ),
                });
            }
            if self.node(app_consumers[0]).mode != UpdateMode::Poll {
                return Err(GraphError::IllegalVariableNetwork {
                    what: format!(
                        "the application consumer of a poll-mode feeder must poll:\n{}",
                        self.describe_network(network_id)
                    ),
                });
            }
        }

        Ok(())
    }

    /// Multi-line description of one network, used in diagnostics.
    pub fn describe_network(&self, network_id: NetworkId) -> String {
        let network = self.network(network_id);
        let mut out = format!(
            "network {} (type {}, {} elements{}):\n",
            network.id,
            network
                .value_type
                .map_or_else(|| "unresolved".to_string(), |t| t.to_string()),
            network.n_elements,
            if network.dissolved { ", dissolved" } else { "" }
        );
        for &node_id in &network.nodes {
            let role = if Some(node_id) == network.feeder {
                "feeder  "
            } else {
                "consumer"
            };
            out.push_str(&format!("  {} {}\n", role, self.node(node_id).describe()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::ModuleId;

    fn app_node(
        graph: &mut ConnectionGraph,
        name: &str,
        direction: NodeDirection,
        mode: UpdateMode,
        value_type: Option<ValueType>,
        n_elements: usize,
    ) -> NodeId {
        graph.add_node(
            NodeKind::Application {
                module: ModuleId::from_index(0),
                name: name.to_string(),
                unit: String::new(),
                description: String::new(),
            },
            direction,
            mode,
            value_type,
            n_elements,
        )
    }

    #[test]
    fn connect_creates_network_with_feeder_and_consumer() {
        let mut graph = ConnectionGraph::new();
        let out = app_node(
            &mut graph,
            "out",
            NodeDirection::Feeding,
            UpdateMode::Push,
            Some(ValueType::Int32),
            1,
        );
        let inp = app_node(
            &mut graph,
            "in",
            NodeDirection::Consuming,
            UpdateMode::Push,
            Some(ValueType::Int32),
            1,
        );
        let network = graph.connect(out, inp).unwrap();
        assert_eq!(graph.network(network).feeder, Some(out));
        assert_eq!(graph.network(network).consumer_count(), 1);
    }

    #[test]
    fn connect_unifies_wildcard_type_and_count() {
        let mut graph = ConnectionGraph::new();
        let dev = graph.add_node(
            NodeKind::Device {
                alias: "board".into(),
                register_path: "/ADC/raw".into(),
            },
            NodeDirection::Unresolved,
            UpdateMode::Poll,
            None,
            0,
        );
        let inp = app_node(
            &mut graph,
            "in",
            NodeDirection::Consuming,
            UpdateMode::Poll,
            Some(ValueType::Int16),
            16,
        );
        graph.connect(dev, inp).unwrap();
        assert_eq!(graph.node(dev).value_type, Some(ValueType::Int16));
        assert_eq!(graph.node(dev).n_elements, 16);
        assert_eq!(graph.node(dev).direction, NodeDirection::Feeding);
    }

    #[test]
    fn connect_rejects_count_mismatch() {
        let mut graph = ConnectionGraph::new();
        let a = app_node(
            &mut graph,
            "a",
            NodeDirection::Feeding,
            UpdateMode::Push,
            Some(ValueType::Float32),
            4,
        );
        let b = app_node(
            &mut graph,
            "b",
            NodeDirection::Consuming,
            UpdateMode::Push,
            Some(ValueType::Float32),
            8,
        );
        assert!(matches!(
            graph.connect(a, b),
            Err(GraphError::IllegalParameter { .. })
        ));
    }

    #[test]
    fn connect_rejects_two_distinct_networks() {
        let mut graph = ConnectionGraph::new();
        let a = app_node(&mut graph, "a", NodeDirection::Feeding, UpdateMode::Push, Some(ValueType::Int8), 1);
        let b = app_node(&mut graph, "b", NodeDirection::Consuming, UpdateMode::Push, Some(ValueType::Int8), 1);
        let c = app_node(&mut graph, "c", NodeDirection::Feeding, UpdateMode::Push, Some(ValueType::Int8), 1);
        let d = app_node(&mut graph, "d", NodeDirection::Consuming, UpdateMode::Push, Some(ValueType::Int8), 1);
        graph.connect(a, b).unwrap();
        graph.connect(c, d).unwrap();
        assert!(matches!(
            graph.connect(b, d),
            Err(GraphError::IllegalVariableNetwork { .. })
        ));
    }

    #[test]
    fn second_feeder_is_rejected() {
        let mut graph = ConnectionGraph::new();
        let a = app_node(&mut graph, "a", NodeDirection::Feeding, UpdateMode::Push, Some(ValueType::Int8), 1);
        let b = app_node(&mut graph, "b", NodeDirection::Consuming, UpdateMode::Push, Some(ValueType::Int8), 1);
        let c = app_node(&mut graph, "c", NodeDirection::Feeding, UpdateMode::Push, Some(ValueType::Int8), 1);
        graph.connect(a, b).unwrap();
        assert!(matches!(
            graph.connect(c, b),
            Err(GraphError::IllegalVariableNetwork { .. })
        ));
    }

    #[test]
    fn sweep_attaches_constants_to_orphans() {
        let mut graph = ConnectionGraph::new();
        let orphan = app_node(
            &mut graph,
            "orphan",
            NodeDirection::Consuming,
            UpdateMode::Push,
            Some(ValueType::UInt32),
            1,
        );
        let created = graph.sweep_unconnected(false, |n| n.describe()).unwrap();
        assert_eq!(created.len(), 1);
        let network = graph.network(created[0]);
        let feeder = network.feeder.unwrap();
        assert!(matches!(
            graph.node(feeder).kind,
            NodeKind::Constant {
                value: ConstantValue::UInt32(0)
            }
        ));
        assert_eq!(graph.node(orphan).network, Some(created[0]));
        graph.check().unwrap();
    }

    #[test]
    fn sweep_makes_constant_consumer_for_orphan_feeder() {
        let mut graph = ConnectionGraph::new();
        let orphan = app_node(
            &mut graph,
            "orphan_out",
            NodeDirection::Feeding,
            UpdateMode::Push,
            Some(ValueType::Int64),
            2,
        );
        let created = graph.sweep_unconnected(false, |n| n.describe()).unwrap();
        let network = graph.network(created[0]);
        assert_eq!(network.feeder, Some(orphan));
        assert_eq!(network.consumer_count(), 1);
    }

    #[test]
    fn optimise_merges_identical_device_feeders() {
        let mut graph = ConnectionGraph::new();
        let dev1 = graph.add_node(
            NodeKind::Device {
                alias: "board".into(),
                register_path: "/ADC/raw".into(),
            },
            NodeDirection::Unresolved,
            UpdateMode::Push,
            Some(ValueType::Int16),
            4,
        );
        let dev2 = graph.add_node(
            NodeKind::Device {
                alias: "board".into(),
                register_path: "/ADC/raw".into(),
            },
            NodeDirection::Unresolved,
            UpdateMode::Push,
            Some(ValueType::Int16),
            4,
        );
        let in1 = app_node(&mut graph, "in1", NodeDirection::Consuming, UpdateMode::Push, Some(ValueType::Int16), 4);
        let in2 = app_node(&mut graph, "in2", NodeDirection::Consuming, UpdateMode::Push, Some(ValueType::Int16), 4);
        graph.connect(dev1, in1).unwrap();
        graph.connect(dev2, in2).unwrap();
        assert_eq!(graph.network_ids().len(), 2);

        graph.optimise();
        let live = graph.network_ids();
        assert_eq!(live.len(), 1);
        let network = graph.network(live[0]);
        assert_eq!(network.consumer_count(), 2);
        assert_eq!(graph.node(dev1).network, None);
        graph.check().unwrap();
    }

    #[test]
    fn optimise_keeps_networks_with_different_registers() {
        let mut graph = ConnectionGraph::new();
        let dev1 = graph.add_node(
            NodeKind::Device {
                alias: "board".into(),
                register_path: "/ADC/raw".into(),
            },
            NodeDirection::Unresolved,
            UpdateMode::Push,
            Some(ValueType::Int16),
            4,
        );
        let dev2 = graph.add_node(
            NodeKind::Device {
                alias: "board".into(),
                register_path: "/DAC/out".into(),
            },
            NodeDirection::Unresolved,
            UpdateMode::Push,
            Some(ValueType::Int16),
            4,
        );
        let in1 = app_node(&mut graph, "in1", NodeDirection::Consuming, UpdateMode::Push, Some(ValueType::Int16), 4);
        let in2 = app_node(&mut graph, "in2", NodeDirection::Consuming, UpdateMode::Push, Some(ValueType::Int16), 4);
        graph.connect(dev1, in1).unwrap();
        graph.connect(dev2, in2).unwrap();
        graph.optimise();
        assert_eq!(graph.network_ids().len(), 2);
    }

    #[test]
    fn trigger_creates_receiver_in_trigger_network() {
        let mut graph = ConnectionGraph::new();
        let dev = graph.add_node(
            NodeKind::Device {
                alias: "board".into(),
                register_path: "/ADC/raw".into(),
            },
            NodeDirection::Unresolved,
            UpdateMode::Poll,
            Some(ValueType::Int16),
            16,
        );
        let tick = graph.add_node(
            NodeKind::ControlSystem {
                public_name: "/tick".into(),
            },
            NodeDirection::Unresolved,
            UpdateMode::Push,
            Some(ValueType::Int32),
            1,
        );
        let inp = app_node(&mut graph, "in", NodeDirection::Consuming, UpdateMode::Push, Some(ValueType::Int16), 16);
        graph.connect(dev, inp).unwrap();
        graph.set_external_trigger(dev, tick).unwrap();

        let trigger_network = graph.node(tick).network.unwrap();
        assert_eq!(graph.network(trigger_network).feeder, Some(tick));
        let receivers: Vec<_> = graph
            .network(trigger_network)
            .consumers()
            .filter(|&c| graph.node(c).is_trigger_receiver())
            .collect();
        assert_eq!(receivers.len(), 1);
        assert_eq!(graph.node(dev).trigger, Some(tick));
        graph.check().unwrap();
    }

    #[test]
    fn constant_trigger_is_rejected() {
        let mut graph = ConnectionGraph::new();
        let dev = graph.add_node(
            NodeKind::Device {
                alias: "board".into(),
                register_path: "/ADC/raw".into(),
            },
            NodeDirection::Unresolved,
            UpdateMode::Poll,
            Some(ValueType::Int16),
            16,
        );
        let constant = graph.add_node(
            NodeKind::Constant {
                value: ConstantValue::Int32(1),
            },
            NodeDirection::Unresolved,
            UpdateMode::Push,
            Some(ValueType::Int32),
            1,
        );
        assert!(matches!(
            graph.set_external_trigger(dev, constant),
            Err(GraphError::IllegalVariableNetwork { .. })
        ));
    }

    #[test]
    fn poll_feeder_with_two_app_consumers_fails_check() {
        let mut graph = ConnectionGraph::new();
        let dev = graph.add_node(
            NodeKind::Device {
                alias: "board".into(),
                register_path: "/ADC/raw".into(),
            },
            NodeDirection::Unresolved,
            UpdateMode::Poll,
            Some(ValueType::Int16),
            1,
        );
        let in1 = app_node(&mut graph, "in1", NodeDirection::Consuming, UpdateMode::Poll, Some(ValueType::Int16), 1);
        let in2 = app_node(&mut graph, "in2", NodeDirection::Consuming, UpdateMode::Poll, Some(ValueType::Int16), 1);
        graph.connect(dev, in1).unwrap();
        graph.connect(dev, in2).unwrap();
        assert!(matches!(
            graph.check(),
            Err(GraphError::IllegalVariableNetwork { .. })
        ));
    }
}
