//! The application: declaration phase, resolution, runtime lifecycle.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use sf_core::{ModuleId, NodeId, UserValue, ValueType, VariableId};
use sf_graph::{
    dump, ConnectionGraph, ModuleTree, NodeDirection, NodeKind, UpdateMode,
};
use sf_transport::{
    ControlSystemAdapter, DeviceBackend, Interrupter, TestableGate,
};

use crate::error::{RuntimeError, RuntimeResult};
use crate::fanout::InternalModule;
use crate::handle::{AccessorSlot, InputHandle, OutputHandle, PendingRead, RuntimeValue, TypedSlot};
use crate::worker::ModuleWorker;
use crate::xmlgen;

/// Guards against a second live application in the same process.
static APPLICATION_ALIVE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Declaring,
    Initialised,
    Running,
    Shutdown,
}

/// A signalflow application.
///
/// Lifecycle: declare the graph (modules, variables, `connect`), then
/// `run()` resolves it into concrete transports and starts one thread per
/// module plus the internal fan-out threads. `shutdown()` (also called on
/// drop) stops everything in reverse order.
pub struct Application {
    name: String,
    pub(crate) graph: ConnectionGraph,
    pub(crate) modules: ModuleTree,
    pub(crate) slots: HashMap<NodeId, TypedSlot>,
    pub(crate) internal_modules: Vec<Box<dyn InternalModule>>,
    pub(crate) interrupters: Vec<Arc<dyn Interrupter>>,
    pub(crate) backend_registry: HashMap<String, Arc<dyn DeviceBackend>>,
    pub(crate) cs_adapter: Option<Arc<dyn ControlSystemAdapter>>,
    pub(crate) gate: Option<Arc<TestableGate>>,
    pub(crate) queue_depth: usize,
    pub(crate) debug_nodes: HashSet<NodeId>,
    warn_unconnected: bool,
    next_variable_id: u64,
    workers: Vec<(ModuleId, Box<dyn ModuleWorker>)>,
    threads: Vec<JoinHandle<()>>,
    phase: Phase,
}

impl Application {
    /// Create the application. Only one instance may be alive per process;
    /// the name must be alphanumeric/underscore.
    pub fn new(name: &str) -> RuntimeResult<Self> {
        let modules = ModuleTree::new(name)?;
        if APPLICATION_ALIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RuntimeError::IllegalParameter {
                what: "an Application instance is already alive in this process".to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            graph: ConnectionGraph::new(),
            modules,
            slots: HashMap::new(),
            internal_modules: Vec::new(),
            interrupters: Vec::new(),
            backend_registry: HashMap::new(),
            cs_adapter: None,
            gate: None,
            queue_depth: 3,
            debug_nodes: HashSet::new(),
            warn_unconnected: false,
            next_variable_id: 0,
            workers: Vec::new(),
            threads: Vec::new(),
            phase: Phase::Declaring,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The root of the module tree.
    pub fn root(&self) -> ModuleId {
        self.modules.root()
    }

    fn ensure_declaring(&self) -> RuntimeResult<()> {
        if self.phase != Phase::Declaring {
            return Err(RuntimeError::IllegalParameter {
                what: "the connection graph is frozen after initialise()".to_string(),
            });
        }
        Ok(())
    }

    // ---- declaration phase -------------------------------------------------

    /// Add a grouping level; affects naming only.
    pub fn add_group(
        &mut self,
        parent: ModuleId,
        name: &str,
        description: &str,
    ) -> RuntimeResult<ModuleId> {
        self.ensure_declaring()?;
        Ok(self.modules.add_group(parent, name, description)?)
    }

    /// Add an application module; its worker is registered separately with
    /// [`add_worker`](Self::add_worker).
    pub fn add_module(
        &mut self,
        parent: ModuleId,
        name: &str,
        description: &str,
    ) -> RuntimeResult<ModuleId> {
        self.ensure_declaring()?;
        Ok(self.modules.add_module(parent, name, description)?)
    }

    /// Skip this hierarchy level when composing exported names.
    pub fn eliminate_hierarchy(&mut self, module: ModuleId) {
        self.modules.set_eliminate_hierarchy(module);
    }

    /// Register the worker body of a module.
    pub fn add_worker(&mut self, module: ModuleId, worker: impl ModuleWorker) {
        self.workers.push((module, Box::new(worker)));
    }

    /// Declare a consuming variable of a module. An element count of 0
    /// inherits the count from the connected peer.
    pub fn input<T: RuntimeValue>(
        &mut self,
        module: ModuleId,
        name: &str,
        unit: &str,
        description: &str,
        mode: UpdateMode,
        n_elements: usize,
    ) -> RuntimeResult<InputHandle<T>> {
        let (node, slot) =
            self.application_node::<T>(module, name, unit, description, NodeDirection::Consuming, mode, n_elements)?;
        Ok(InputHandle::new(node, slot))
    }

    /// Declare a feeding (push-mode) variable of a module.
    pub fn output<T: RuntimeValue>(
        &mut self,
        module: ModuleId,
        name: &str,
        unit: &str,
        description: &str,
        n_elements: usize,
    ) -> RuntimeResult<OutputHandle<T>> {
        let (node, slot) = self.application_node::<T>(
            module,
            name,
            unit,
            description,
            NodeDirection::Feeding,
            UpdateMode::Push,
            n_elements,
        )?;
        Ok(OutputHandle::new(node, slot))
    }

    #[allow(clippy::too_many_arguments)]
    fn application_node<T: RuntimeValue>(
        &mut self,
        module: ModuleId,
        name: &str,
        unit: &str,
        description: &str,
        direction: NodeDirection,
        mode: UpdateMode,
        n_elements: usize,
    ) -> RuntimeResult<(NodeId, Arc<AccessorSlot<T>>)> {
        self.ensure_declaring()?;
        let node = self.graph.add_node(
            NodeKind::Application {
                module,
                name: name.to_string(),
                unit: unit.to_string(),
                description: description.to_string(),
            },
            direction,
            mode,
            Some(T::VALUE_TYPE),
            n_elements,
        );
        self.modules.register_node(module, node);
        let slot = Arc::new(AccessorSlot::<T>::new());
        self.slots.insert(node, T::wrap_slot(Arc::clone(&slot)));
        Ok((node, slot))
    }

    /// Declare a device register endpoint. Direction is taken from context
    /// when the node is connected.
    pub fn device_register(
        &mut self,
        alias: &str,
        register_path: &str,
        mode: UpdateMode,
        value_type: Option<ValueType>,
        n_elements: usize,
    ) -> RuntimeResult<NodeId> {
        self.ensure_declaring()?;
        Ok(self.graph.add_node(
            NodeKind::Device {
                alias: alias.to_string(),
                register_path: register_path.to_string(),
            },
            NodeDirection::Unresolved,
            mode,
            value_type,
            n_elements,
        ))
    }

    /// Declare a control-system variable endpoint by public name.
    pub fn control_system_variable(
        &mut self,
        public_name: &str,
        value_type: Option<ValueType>,
        n_elements: usize,
    ) -> RuntimeResult<NodeId> {
        self.ensure_declaring()?;
        Ok(self.graph.add_node(
            NodeKind::ControlSystem {
                public_name: public_name.to_string(),
            },
            NodeDirection::Unresolved,
            UpdateMode::Push,
            value_type,
            n_elements,
        ))
    }

    /// Declare a constant endpoint.
    pub fn constant<T: UserValue>(&mut self, value: T, n_elements: usize) -> RuntimeResult<NodeId> {
        self.ensure_declaring()?;
        Ok(self.graph.add_node(
            NodeKind::Constant {
                value: value.to_constant(),
            },
            NodeDirection::Unresolved,
            UpdateMode::Push,
            Some(T::VALUE_TYPE),
            n_elements.max(1),
        ))
    }

    /// Connect two endpoints (create or merge a network).
    pub fn connect(&mut self, a: NodeId, b: NodeId) -> RuntimeResult<()> {
        self.ensure_declaring()?;
        self.graph.connect(a, b)?;
        Ok(())
    }

    /// Let `trigger` drive the transfers of the poll-mode node `node`.
    pub fn set_external_trigger(&mut self, node: NodeId, trigger: NodeId) -> RuntimeResult<()> {
        self.ensure_declaring()?;
        self.graph.set_external_trigger(node, trigger)?;
        Ok(())
    }

    /// Register the backend serving a device alias.
    pub fn register_device_backend(&mut self, alias: &str, backend: Arc<dyn DeviceBackend>) {
        self.backend_registry.insert(alias.to_string(), backend);
    }

    /// Set the control-system adapter.
    pub fn set_control_system_adapter(&mut self, adapter: Arc<dyn ControlSystemAdapter>) {
        if let Some(gate) = &self.gate {
            adapter.attach_testable_gate(Arc::clone(gate));
        }
        self.cs_adapter = Some(adapter);
    }

    /// Emit a warning for every variable left unconnected at initialise().
    pub fn enable_unconnected_warnings(&mut self) {
        self.warn_unconnected = true;
    }

    /// Log every transfer of the given variable.
    pub fn enable_debug(&mut self, node: NodeId) {
        self.debug_nodes.insert(node);
    }

    /// Queue depth of synchronized transport pairs created from here on.
    pub fn set_queue_depth(&mut self, depth: usize) {
        self.queue_depth = depth.max(1);
    }

    /// Serialise all thread progress through a single cooperative gate so
    /// tests can step the application deterministically.
    pub fn enable_testable_mode(&mut self) -> RuntimeResult<()> {
        self.ensure_declaring()?;
        let gate = Arc::new(TestableGate::new());
        if let Some(adapter) = &self.cs_adapter {
            adapter.attach_testable_gate(Arc::clone(&gate));
        }
        self.gate = Some(gate);
        Ok(())
    }

    /// The testable gate, if testable mode is enabled.
    pub fn testable_gate(&self) -> Option<Arc<TestableGate>> {
        self.gate.clone()
    }

    /// Log every gate acquire/release, for debugging stuck tests.
    pub fn enable_testable_mode_debug(&self) {
        if let Some(gate) = &self.gate {
            gate.enable_debug();
        }
    }

    pub(crate) fn next_variable_id(&mut self) -> VariableId {
        let id = VariableId::new(self.next_variable_id);
        self.next_variable_id += 1;
        id
    }

    /// Qualified display name of an endpoint.
    pub(crate) fn node_qualified_name(&self, node: NodeId) -> String {
        match &self.graph.node(node).kind {
            NodeKind::Application { module, name, .. } => {
                self.modules.qualified_variable_name(*module, name)
            }
            NodeKind::Device {
                alias,
                register_path,
            } => format!("Device:{alias}{register_path}"),
            NodeKind::ControlSystem { public_name } => format!("ControlSystem:{public_name}"),
            NodeKind::Constant { .. } => "Constant".to_string(),
            NodeKind::TriggerReceiver { target } => {
                format!("TriggerReceiver:{}", self.node_qualified_name(*target))
            }
        }
    }

    /// Unit and description taken from the application endpoint of a
    /// network, for the exported variable record.
    pub(crate) fn network_unit_description(
        &self,
        network: Option<sf_core::NetworkId>,
    ) -> (String, String) {
        let Some(network) = network else {
            return (String::new(), String::new());
        };
        for &node_id in &self.graph.network(network).nodes {
            if let NodeKind::Application {
                unit, description, ..
            } = &self.graph.node(node_id).kind
            {
                return (unit.clone(), description.clone());
            }
        }
        (String::new(), String::new())
    }

    // ---- lifecycle ---------------------------------------------------------

    /// Freeze and resolve the graph: sweep unconnected variables, merge
    /// identical device feeders, validate, then allocate transports and
    /// fan-outs and install the concrete accessors into all handles.
    pub fn initialise(&mut self) -> RuntimeResult<()> {
        self.ensure_declaring()?;

        let warn = self.warn_unconnected;
        let modules = &self.modules;
        self.graph.sweep_unconnected(warn, |node| match &node.kind {
            NodeKind::Application { module, name, .. } => {
                modules.qualified_variable_name(*module, name)
            }
            _ => node.describe(),
        })?;
        self.graph.optimise();
        self.graph.check()?;
        self.resolve_all()?;
        self.phase = Phase::Initialised;
        Ok(())
    }

    /// Start the application: prepare the modules, activate the fan-out
    /// threads, pick up initial values, then start one thread per module.
    ///
    /// In testable mode the calling thread holds the gate when this
    /// returns; module threads wait for [`step_application`](Self::step_application)
    /// or a gate hand-over before making progress.
    pub fn run(&mut self) -> RuntimeResult<()> {
        if self.phase == Phase::Declaring {
            self.initialise()?;
        }
        if self.phase != Phase::Initialised {
            return Err(RuntimeError::IllegalParameter {
                what: "the application is already running or shut down".to_string(),
            });
        }

        if let Some(gate) = &self.gate {
            if !gate.held_by_current_thread() {
                gate.acquire("run")?;
            }
        }

        for (_, worker) in &mut self.workers {
            worker.prepare()?;
        }

        // fan-outs must be live before modules: a module's first read may
        // depend on a fan-out already running
        for internal in &mut self.internal_modules {
            internal.activate();
        }

        self.read_initial_values()?;

        let workers = std::mem::take(&mut self.workers);
        for (module, mut worker) in workers {
            let gate = self.gate.clone();
            let name = self.modules.qualified_module_name(module);
            let thread_name = name.clone();
            let handle = std::thread::Builder::new()
                .name(thread_name)
                .spawn(move || {
                    if let Some(gate) = &gate {
                        if gate.acquire("module start").is_err() {
                            return;
                        }
                    }
                    match worker.main_loop() {
                        Ok(()) => {}
                        Err(e) if e.is_interrupted() => {}
                        Err(e) => {
                            tracing::error!(module = %name, error = %e, "module main loop failed");
                        }
                    }
                    if let Some(gate) = &gate {
                        gate.release("module terminate");
                    }
                })?;
            self.threads.push(handle);
        }

        self.phase = Phase::Running;
        Ok(())
    }

    /// One `read_latest` per consuming application variable, so modules
    /// start from the current values without reacting to them.
    fn read_initial_values(&self) -> RuntimeResult<()> {
        for (node_id, slot) in &self.slots {
            if self.graph.node(*node_id).direction == NodeDirection::Consuming {
                slot.read_latest_installed()?;
            }
        }
        Ok(())
    }

    /// Ordered shutdown: release the gate if held, stop the fan-out
    /// threads, interrupt all blocking operations, join the module threads.
    /// Idempotent; also called on drop.
    pub fn shutdown(&mut self) {
        if self.phase == Phase::Shutdown {
            return;
        }
        if let Some(gate) = &self.gate {
            gate.release("shutdown");
        }
        // fan-outs first: their threads feed the modules
        for internal in &mut self.internal_modules {
            internal.deactivate();
        }
        for interrupter in &self.interrupters {
            interrupter.interrupt();
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        self.phase = Phase::Shutdown;
    }

    // ---- testable mode -----------------------------------------------------

    /// Let the application run until all pending values are processed.
    ///
    /// Requires testable mode and at least one pending value. Raises
    /// `TestsStalled` when no other thread can make progress.
    pub fn step_application(&self) -> RuntimeResult<()> {
        let gate = self.gate.as_ref().ok_or_else(|| RuntimeError::IllegalParameter {
            what: "testable mode is not enabled".to_string(),
        })?;
        if gate.total_pending() == 0 {
            return Err(RuntimeError::IllegalParameter {
                what: "step_application() called with no input for the application to process"
                    .to_string(),
            });
        }
        while gate.total_pending() > 0 {
            gate.release("step_application");
            std::thread::yield_now();
            gate.acquire("step_application")?;
        }
        Ok(())
    }

    /// Sum of all pending-value counters (0 when quiescent).
    pub fn pending_messages(&self) -> u64 {
        self.gate.as_ref().map_or(0, |gate| gate.total_pending())
    }

    /// Wait until any of the given inputs has a new value; returns its
    /// index. Respects the testable gate.
    pub fn read_any(&self, inputs: &mut [&mut dyn PendingRead]) -> RuntimeResult<usize> {
        loop {
            for (index, input) in inputs.iter_mut().enumerate() {
                if input.try_consume()? {
                    return Ok(index);
                }
            }
            match &self.gate {
                Some(gate) => {
                    gate.release("read_any");
                    std::thread::sleep(Duration::from_millis(1));
                    gate.acquire("read_any")?;
                }
                None => std::thread::sleep(Duration::from_micros(100)),
            }
        }
    }

    // ---- dumps and exported artefacts --------------------------------------

    /// Human-readable listing of all declared connections.
    pub fn dump_connections(&self) -> String {
        dump::dump_connections(&self.graph, &self.modules)
    }

    /// Write the connection graph as Graphviz dot.
    pub fn dump_connection_graph(&self, path: impl AsRef<Path>) -> RuntimeResult<()> {
        let dot = dump::connection_graph_dot(&self.graph, &self.modules);
        std::fs::write(path, dot)?;
        Ok(())
    }

    /// Write the exported variable list as XML, keyed by public name and
    /// stable across runs for the same declaration.
    pub fn generate_xml(&self, path: impl AsRef<Path>) -> RuntimeResult<()> {
        let entries = xmlgen::variable_list(&self.graph)?;
        std::fs::write(path, xmlgen::render_xml(&self.name, &entries))?;
        Ok(())
    }

    /// The exported variable list as records.
    pub fn variable_list(&self) -> RuntimeResult<Vec<xmlgen::VariableListEntry>> {
        xmlgen::variable_list(&self.graph)
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        self.shutdown();
        APPLICATION_ALIVE.store(false, Ordering::SeqCst);
    }
}
