//! The connection resolver: turns the checked graph into concrete
//! accessors, transports and fan-outs.
//!
//! Resolution runs per network, dispatched over the network's resolved user
//! type. Three cases:
//!
//! - **A** - the feeder has a fixed implementation (device register or
//!   control-system variable): attach directly for two nodes, otherwise
//!   instantiate the matching distributor (threaded, consuming, or trigger
//!   fan-out).
//! - **B** - the feeder is an application node: a synchronized pair for two
//!   nodes, a feeding fan-out for more.
//! - **C** - the feeder is a constant: application consumers are patched to
//!   constant accessors, device/control-system consumers get the value
//!   written exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use sf_core::{dispatch_value_type, NetworkId, NodeId, UserValue};
use sf_graph::{GraphError, NodeKind, UpdateMode};
use sf_transport::{
    AnyAccessor, ConstantAccessor, DebugAccessor, SyncAccessor, SyncDirection, TestableAccessor,
    TransportError, transport_pair,
};

use crate::application::Application;
use crate::error::{RuntimeError, RuntimeResult};
use crate::fanout::{ConsumingFanOut, FeedingFanOut, SlaveList};
use crate::handle::RuntimeValue;
use crate::threaded::ThreadedFanOut;
use crate::trigger::{PollGroup, TriggerFanOut};

fn wiring_error(what: impl Into<String>) -> RuntimeError {
    RuntimeError::Transport(TransportError::LogicError { what: what.into() })
}

/// State threaded through one resolution run.
///
/// Trigger endpoints produced while resolving a trigger network are parked
/// here, keyed by the trigger feeder node, until the first triggered
/// network picks them up and builds the shared trigger fan-out.
#[derive(Default)]
pub(crate) struct ResolveCtx {
    trigger_ticks: HashMap<NodeId, AnyAccessor>,
    trigger_fanouts: HashMap<NodeId, TriggerFanOut>,
}

impl Application {
    pub(crate) fn resolve_all(&mut self) -> RuntimeResult<()> {
        let mut ctx = ResolveCtx::default();
        for network_id in self.graph.network_ids() {
            self.resolve_network(network_id, &mut ctx)?;
        }
        for (_, fan_out) in ctx.trigger_fanouts {
            self.internal_modules.push(Box::new(fan_out));
        }
        Ok(())
    }

    fn resolve_network(&mut self, network_id: NetworkId, ctx: &mut ResolveCtx) -> RuntimeResult<()> {
        if self.graph.network(network_id).created {
            return Ok(());
        }

        let feeder = self
            .graph
            .network(network_id)
            .feeder
            .ok_or_else(|| wiring_error("network has no feeder after checking"))?;

        // a network driven by an external trigger depends on the trigger
        // network being resolved first: that resolution produces the tick
        // endpoint
        if let Some(trigger) = self.graph.node(feeder).trigger {
            if let Some(dependency) = self.graph.node(trigger).network {
                if !self.graph.network(dependency).created {
                    self.resolve_network(dependency, ctx)?;
                }
            }
        }

        let value_type = self
            .graph
            .network(network_id)
            .value_type
            .ok_or_else(|| wiring_error("network type unresolved after checking"))?;
        dispatch_value_type!(value_type, |U| self.resolve_typed::<U>(network_id, ctx))?;

        self.graph.network_mut(network_id).created = true;
        Ok(())
    }

    fn resolve_typed<T: RuntimeValue>(
        &mut self,
        network_id: NetworkId,
        ctx: &mut ResolveCtx,
    ) -> RuntimeResult<()> {
        let network = self.graph.network(network_id);
        let feeder_id = network
            .feeder
            .ok_or_else(|| wiring_error("network has no feeder after checking"))?;
        let consumers: Vec<NodeId> = network.consumers().collect();
        let n_elements = network.n_elements;
        let feeder = self.graph.node(feeder_id).clone();
        let n_nodes = consumers.len() + 1;
        let external_trigger = feeder.trigger;
        let constant_feeder = matches!(feeder.kind, NodeKind::Constant { .. });

        if feeder.has_fixed_implementation() {
            self.resolve_fixed_feeder::<T>(
                feeder_id,
                &consumers,
                n_elements,
                n_nodes,
                external_trigger,
                ctx,
            )
        } else if !constant_feeder {
            self.resolve_application_feeder::<T>(feeder_id, &consumers, n_elements, n_nodes, ctx)
        } else {
            self.resolve_constant_feeder::<T>(feeder_id, &consumers, n_elements)
        }
    }

    /// Case A: device or control-system feeder.
    fn resolve_fixed_feeder<T: RuntimeValue>(
        &mut self,
        feeder_id: NodeId,
        consumers: &[NodeId],
        n_elements: usize,
        n_nodes: usize,
        external_trigger: Option<NodeId>,
        ctx: &mut ResolveCtx,
    ) -> RuntimeResult<()> {
        let feeder = self.graph.node(feeder_id).clone();

        // The feeder's implementation is used as the consuming end of the
        // pair it logically forms: we read from it.
        let feeding_impl: Box<dyn SyncAccessor<T>> = match &feeder.kind {
            NodeKind::Device {
                alias,
                register_path,
            } => self.create_device_accessor::<T>(
                alias,
                register_path,
                feeder.mode == UpdateMode::Push,
                n_elements,
            )?,
            NodeKind::ControlSystem { .. } => self.create_process_variable::<T>(feeder_id)?,
            _ => return Err(wiring_error("unexpected feeder kind")),
        };

        if n_nodes == 2 && external_trigger.is_none() {
            let consumer_id = consumers[0];
            let consumer = self.graph.node(consumer_id).clone();
            match &consumer.kind {
                NodeKind::Application { .. } => {
                    // the feeder implementation becomes the consumer's
                    // accessor directly
                    let accessor = self.maybe_debug::<T>(consumer_id, feeding_impl);
                    self.install::<T>(consumer_id, accessor)?;
                }
                NodeKind::Device {
                    alias,
                    register_path,
                } => {
                    // device-to-device needs an actively driven bridge
                    let consuming_impl =
                        self.create_device_accessor::<T>(alias, register_path, false, n_elements)?;
                    let mut slaves = SlaveList::new();
                    slaves.add(consuming_impl)?;
                    let fan_out = ThreadedFanOut::new(
                        self.node_qualified_name(feeder_id),
                        feeding_impl,
                        slaves,
                        self.gate.clone(),
                    );
                    self.internal_modules.push(Box::new(fan_out));
                }
                NodeKind::ControlSystem { .. } => {
                    let consuming_impl = self.create_process_variable::<T>(consumer_id)?;
                    let mut slaves = SlaveList::new();
                    slaves.add(consuming_impl)?;
                    let fan_out = ThreadedFanOut::new(
                        self.node_qualified_name(feeder_id),
                        feeding_impl,
                        slaves,
                        self.gate.clone(),
                    );
                    self.internal_modules.push(Box::new(fan_out));
                }
                NodeKind::TriggerReceiver { .. } => {
                    // the feeder itself becomes the tick endpoint of the
                    // triggered networks
                    ctx.trigger_ticks.insert(feeder_id, T::into_any(feeding_impl));
                }
                NodeKind::Constant { .. } => {
                    return Err(RuntimeError::NotYetImplemented {
                        what: "constant consumers of fixed-implementation feeders".to_string(),
                    });
                }
            }
            return Ok(());
        }

        // distributor path
        let use_feeder_trigger = external_trigger.is_none() && feeder.mode == UpdateMode::Push;
        let consuming_mode = external_trigger.is_none() && !use_feeder_trigger;

        let mut slaves = SlaveList::<T>::new();
        let mut poll_consumer: Option<NodeId> = None;
        let mut trigger_receiver_end: Option<Box<dyn SyncAccessor<T>>> = None;

        for &consumer_id in consumers {
            let consumer = self.graph.node(consumer_id).clone();
            match &consumer.kind {
                NodeKind::Application { .. } => {
                    if consuming_mode
                        && consumer.mode == UpdateMode::Poll
                        && poll_consumer.is_none()
                    {
                        // this consumer will own the consuming fan-out
                        poll_consumer = Some(consumer_id);
                    } else {
                        let (sender, receiver) =
                            self.create_application_pair::<T>(consumer_id, None, n_elements)?;
                        slaves.add(sender)?;
                        self.install::<T>(consumer_id, receiver)?;
                    }
                }
                NodeKind::ControlSystem { .. } => {
                    slaves.add(self.create_process_variable::<T>(consumer_id)?)?;
                }
                NodeKind::Device {
                    alias,
                    register_path,
                } => {
                    slaves.add(self.create_device_accessor::<T>(
                        alias,
                        register_path,
                        false,
                        n_elements,
                    )?)?;
                }
                NodeKind::TriggerReceiver { .. } => {
                    // one shared pair serves all trigger receivers
                    if trigger_receiver_end.is_none() {
                        let (sender, receiver) =
                            self.create_application_pair::<T>(feeder_id, None, n_elements)?;
                        slaves.add(sender)?;
                        trigger_receiver_end = Some(receiver);
                    }
                }
                NodeKind::Constant { .. } => {
                    return Err(RuntimeError::NotYetImplemented {
                        what: "constant consumers of fixed-implementation feeders".to_string(),
                    });
                }
            }
        }
        if let Some(receiver) = trigger_receiver_end {
            ctx.trigger_ticks.insert(feeder_id, T::into_any(receiver));
        }

        if let Some(trigger_node) = external_trigger {
            // one trigger fan-out per distinct trigger source, shared
            // across all networks using that trigger
            if !ctx.trigger_fanouts.contains_key(&trigger_node) {
                let tick = ctx.trigger_ticks.remove(&trigger_node).ok_or_else(|| {
                    wiring_error("trigger network did not produce a tick endpoint")
                })?;
                let fan_out = TriggerFanOut::new(
                    self.node_qualified_name(trigger_node),
                    tick,
                    self.gate.clone(),
                );
                ctx.trigger_fanouts.insert(trigger_node, fan_out);
            }
            if let Some(fan_out) = ctx.trigger_fanouts.get_mut(&trigger_node) {
                fan_out.add_group(Box::new(PollGroup::new(feeding_impl, slaves)));
            }
        } else if use_feeder_trigger {
            let fan_out = ThreadedFanOut::new(
                self.node_qualified_name(feeder_id),
                feeding_impl,
                slaves,
                self.gate.clone(),
            );
            self.internal_modules.push(Box::new(fan_out));
        } else {
            let target = poll_consumer.ok_or_else(|| {
                wiring_error("a poll-mode feeder without trigger requires a polling consumer")
            })?;
            let fan_out = ConsumingFanOut::new(feeding_impl, slaves);
            let accessor =
                self.maybe_debug::<T>(target, Box::new(fan_out) as Box<dyn SyncAccessor<T>>);
            if let Some(gate) = &self.gate {
                // poll variables are flagged for the test harness, never
                // wrapped
                gate.register_variable(
                    accessor.variable_id(),
                    self.node_qualified_name(target),
                    None,
                    true,
                );
            }
            self.install::<T>(target, accessor)?;
        }
        Ok(())
    }

    /// Case B: application feeder.
    fn resolve_application_feeder<T: RuntimeValue>(
        &mut self,
        feeder_id: NodeId,
        consumers: &[NodeId],
        n_elements: usize,
        n_nodes: usize,
        ctx: &mut ResolveCtx,
    ) -> RuntimeResult<()> {
        if !self.graph.node(feeder_id).is_application() {
            return Err(wiring_error("unexpected feeder kind"));
        }

        if n_nodes == 2 {
            let consumer_id = consumers[0];
            let consumer = self.graph.node(consumer_id).clone();
            match &consumer.kind {
                NodeKind::Application { .. } => {
                    let (sender, receiver) =
                        self.create_application_pair::<T>(feeder_id, Some(consumer_id), n_elements)?;
                    self.install::<T>(feeder_id, sender)?;
                    self.install::<T>(consumer_id, receiver)?;
                }
                NodeKind::ControlSystem { .. } => {
                    let accessor = self.create_process_variable::<T>(consumer_id)?;
                    let accessor = self.maybe_debug::<T>(feeder_id, accessor);
                    self.install::<T>(feeder_id, accessor)?;
                }
                NodeKind::Device {
                    alias,
                    register_path,
                } => {
                    let accessor =
                        self.create_device_accessor::<T>(alias, register_path, false, n_elements)?;
                    let accessor = self.maybe_debug::<T>(feeder_id, accessor);
                    self.install::<T>(feeder_id, accessor)?;
                }
                NodeKind::TriggerReceiver { .. } => {
                    let (sender, receiver) =
                        self.create_application_pair::<T>(feeder_id, None, n_elements)?;
                    self.install::<T>(feeder_id, sender)?;
                    ctx.trigger_ticks.insert(feeder_id, T::into_any(receiver));
                }
                NodeKind::Constant { value } => {
                    // synthesised for an otherwise unconnected output:
                    // writes go nowhere
                    let typed = T::from_constant(value)
                        .ok_or_else(|| wiring_error("constant value type mismatch"))?;
                    let variable_id = self.next_variable_id();
                    let constant = ConstantAccessor::new(typed, n_elements, variable_id);
                    if let Some(interrupter) = constant.interrupter() {
                        self.interrupters.push(interrupter);
                    }
                    self.install::<T>(feeder_id, Box::new(constant))?;
                }
            }
            return Ok(());
        }

        // the feeding fan-out becomes the application's write endpoint
        let variable_id = self.next_variable_id();
        let mut fan_out =
            FeedingFanOut::<T>::new(self.node_qualified_name(feeder_id), variable_id, n_elements);
        let mut trigger_receiver_end: Option<Box<dyn SyncAccessor<T>>> = None;

        for &consumer_id in consumers {
            let consumer = self.graph.node(consumer_id).clone();
            match &consumer.kind {
                NodeKind::Application { .. } => {
                    let (sender, receiver) =
                        self.create_application_pair::<T>(consumer_id, None, n_elements)?;
                    fan_out.add_slave(sender)?;
                    self.install::<T>(consumer_id, receiver)?;
                }
                NodeKind::ControlSystem { .. } => {
                    fan_out.add_slave(self.create_process_variable::<T>(consumer_id)?)?;
                }
                NodeKind::Device {
                    alias,
                    register_path,
                } => {
                    fan_out.add_slave(self.create_device_accessor::<T>(
                        alias,
                        register_path,
                        false,
                        n_elements,
                    )?)?;
                }
                NodeKind::TriggerReceiver { .. } => {
                    if trigger_receiver_end.is_none() {
                        let (sender, receiver) =
                            self.create_application_pair::<T>(feeder_id, None, n_elements)?;
                        fan_out.add_slave(sender)?;
                        trigger_receiver_end = Some(receiver);
                    }
                }
                NodeKind::Constant { .. } => {
                    return Err(RuntimeError::NotYetImplemented {
                        what: "constant consumers of feeding fan-outs".to_string(),
                    });
                }
            }
        }
        if let Some(receiver) = trigger_receiver_end {
            ctx.trigger_ticks.insert(feeder_id, T::into_any(receiver));
        }

        let accessor =
            self.maybe_debug::<T>(feeder_id, Box::new(fan_out) as Box<dyn SyncAccessor<T>>);
        self.install::<T>(feeder_id, accessor)?;
        Ok(())
    }

    /// Case C: constant feeder.
    fn resolve_constant_feeder<T: RuntimeValue>(
        &mut self,
        feeder_id: NodeId,
        consumers: &[NodeId],
        n_elements: usize,
    ) -> RuntimeResult<()> {
        let feeder = self.graph.node(feeder_id).clone();
        let NodeKind::Constant { value } = &feeder.kind else {
            return Err(wiring_error("unexpected feeder kind"));
        };
        let typed_value =
            T::from_constant(value).ok_or_else(|| wiring_error("constant value type mismatch"))?;

        for &consumer_id in consumers {
            let consumer = self.graph.node(consumer_id).clone();
            match &consumer.kind {
                NodeKind::Application { .. } => {
                    let variable_id = self.next_variable_id();
                    let constant =
                        ConstantAccessor::new(typed_value.clone(), n_elements, variable_id);
                    if let Some(interrupter) = constant.interrupter() {
                        self.interrupters.push(interrupter);
                    }
                    let accessor: Box<dyn SyncAccessor<T>> = match &self.gate {
                        Some(gate) => {
                            gate.register_variable(
                                variable_id,
                                "Constant".to_string(),
                                None,
                                false,
                            );
                            Box::new(TestableAccessor::new(Box::new(constant), Arc::clone(gate)))
                        }
                        None => Box::new(constant),
                    };
                    let accessor = self.maybe_debug::<T>(consumer_id, accessor);
                    self.install::<T>(consumer_id, accessor)?;
                }
                NodeKind::ControlSystem { .. } => {
                    // write the value once, never subscribe to updates
                    let mut accessor = self.create_process_variable::<T>(consumer_id)?;
                    accessor.buffer_mut().fill(typed_value.clone());
                    accessor.write()?;
                }
                NodeKind::Device {
                    alias,
                    register_path,
                } => {
                    let mut accessor =
                        self.create_device_accessor::<T>(alias, register_path, false, n_elements)?;
                    accessor.buffer_mut().fill(typed_value.clone());
                    accessor.write()?;
                }
                NodeKind::TriggerReceiver { .. } => {
                    return Err(RuntimeError::Graph(GraphError::IllegalVariableNetwork {
                        what: "using constants as triggers is not supported".to_string(),
                    }));
                }
                NodeKind::Constant { .. } => {
                    return Err(RuntimeError::NotYetImplemented {
                        what: "constant-to-constant networks".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn create_device_accessor<T: RuntimeValue>(
        &mut self,
        alias: &str,
        register_path: &str,
        wait_for_new_data: bool,
        n_elements: usize,
    ) -> RuntimeResult<Box<dyn SyncAccessor<T>>> {
        let backend = self.backend_registry.get(alias).cloned().ok_or_else(|| {
            RuntimeError::IllegalParameter {
                what: format!("no device backend registered for alias '{alias}'"),
            }
        })?;
        if !backend.is_open() {
            backend.open()?;
        }
        let variable_id = self.next_variable_id();
        let any =
            backend.register_accessor(register_path, T::VALUE_TYPE, n_elements, wait_for_new_data, variable_id)?;
        if let Some(interrupter) = any.interrupter() {
            self.interrupters.push(interrupter);
        }
        T::into_typed(any)
            .ok_or_else(|| wiring_error("device backend returned an accessor of the wrong type"))
    }

    fn create_process_variable<T: RuntimeValue>(
        &mut self,
        node_id: NodeId,
    ) -> RuntimeResult<Box<dyn SyncAccessor<T>>> {
        let adapter = self.cs_adapter.clone().ok_or_else(|| RuntimeError::IllegalParameter {
            what: "no control-system adapter has been set".to_string(),
        })?;
        let node = self.graph.node(node_id).clone();
        let NodeKind::ControlSystem { public_name } = &node.kind else {
            return Err(wiring_error("expected a control-system node"));
        };
        let direction = if node.direction == sf_graph::NodeDirection::Feeding {
            SyncDirection::ControlSystemToDevice
        } else {
            SyncDirection::DeviceToControlSystem
        };
        let (unit, description) = self.network_unit_description(node.network);
        let variable_id = self.next_variable_id();
        let any = adapter.create_process_array(
            direction,
            public_name,
            T::VALUE_TYPE,
            node.n_elements,
            &unit,
            &description,
            variable_id,
        )?;
        if let Some(interrupter) = any.interrupter() {
            self.interrupters.push(interrupter);
        }
        let accessor = T::into_typed(any)
            .ok_or_else(|| wiring_error("adapter returned an accessor of the wrong type"))?;

        // testable mode decorates the receiving side of control-system
        // variables; a variable whose single consumer polls is flagged as
        // poll-mode instead (the communication stays pull-driven)
        if node.direction == sf_graph::NodeDirection::Feeding {
            if let Some(gate) = &self.gate {
                let effective_poll = node
                    .network
                    .map(|network_id| {
                        let network = self.graph.network(network_id);
                        network.consumer_count() == 1
                            && network
                                .consumers()
                                .next()
                                .map_or(false, |c| self.graph.node(c).mode == UpdateMode::Poll)
                    })
                    .unwrap_or(false);
                gate.register_variable(
                    variable_id,
                    format!("ControlSystem:{public_name}"),
                    accessor.queue_probe(),
                    effective_poll,
                );
                if !effective_poll {
                    return Ok(Box::new(TestableAccessor::new(accessor, Arc::clone(gate))));
                }
            }
        }
        Ok(accessor)
    }

    /// Create a synchronized pair for an application node. `consumer_id`
    /// is set when one pair directly links a feeder to a consumer.
    fn create_application_pair<T: RuntimeValue>(
        &mut self,
        node_id: NodeId,
        consumer_id: Option<NodeId>,
        n_elements: usize,
    ) -> RuntimeResult<(Box<dyn SyncAccessor<T>>, Box<dyn SyncAccessor<T>>)> {
        let node = self.graph.node(node_id).clone();
        let variable_id = self.next_variable_id();
        let name = self.node_qualified_name(node_id);
        let (sender, receiver) =
            transport_pair::<T>(name.clone(), 1, n_elements, self.queue_depth, variable_id);
        let mut sender: Box<dyn SyncAccessor<T>> = Box::new(sender);
        let mut receiver: Box<dyn SyncAccessor<T>> = Box::new(receiver);
        if let Some(interrupter) = sender.interrupter() {
            // both ends share the interrupter
            self.interrupters.push(interrupter);
        }

        if self.gate.is_some() && node.mode == UpdateMode::Push {
            let gate = self.gate.clone().ok_or_else(|| wiring_error("gate vanished"))?;
            let mut display = format!("Internal:{name}");
            if let Some(consumer) = consumer_id {
                display.push_str(&format!("->{}", self.node_qualified_name(consumer)));
            }
            gate.register_variable(variable_id, display, receiver.queue_probe(), false);
            sender = Box::new(TestableAccessor::new(sender, Arc::clone(&gate)));
            receiver = Box::new(TestableAccessor::new(receiver, gate));
        }

        let debug_requested = self.debug_nodes.contains(&node_id)
            || consumer_id.map_or(false, |c| self.debug_nodes.contains(&c));
        if debug_requested {
            sender = Box::new(DebugAccessor::new(sender, name.clone()));
            let consumer_name =
                consumer_id.map_or_else(|| name.clone(), |c| self.node_qualified_name(c));
            receiver = Box::new(DebugAccessor::new(receiver, consumer_name));
        }
        Ok((sender, receiver))
    }

    fn maybe_debug<T: UserValue>(
        &self,
        node_id: NodeId,
        accessor: Box<dyn SyncAccessor<T>>,
    ) -> Box<dyn SyncAccessor<T>> {
        if self.debug_nodes.contains(&node_id) {
            Box::new(DebugAccessor::new(accessor, self.node_qualified_name(node_id)))
        } else {
            accessor
        }
    }

    fn install<T: RuntimeValue>(
        &mut self,
        node_id: NodeId,
        accessor: Box<dyn SyncAccessor<T>>,
    ) -> RuntimeResult<()> {
        let slot = self
            .slots
            .get(&node_id)
            .ok_or_else(|| wiring_error("no slot registered for application node"))?;
        let slot = T::typed_slot(slot)
            .ok_or_else(|| wiring_error("slot type does not match the resolved network type"))?;
        slot.install(accessor);
        Ok(())
    }
}
