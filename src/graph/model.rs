//! model.rs
//! A graph model: assembles ports, processes, variables and connections,
//! orders them and runs the forward (load) and backward (response) passes.
//!
//! Nodes live in an arena of slots owned by the model; nested models are
//! just another process slot, so a model owns its whole subtree.

use crate::config::graph::{Connection, GraphModelDef, InportDef, OutportDef, Process, ProcessPort};
use crate::error::{Result, SimError};
use crate::graph::dag::{execution_order, ScheduledNode};
use crate::graph::lifecycle::{ActiveNode, Lifecycle};
use crate::graph::node::{NodeIdentity, NodeType};
use crate::graph::port::Port;
use crate::graph::variable::Variable;
use crate::param::Param;
use crate::response::ResponseParam;
use crate::simulation::environment::Environment;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Deepest nesting of models accepted before init gives up.
pub const MAX_NESTING_DEPTH: usize = 64;

struct ProcessSlot {
    node: Box<dyn ActiveNode>,
    inport_ids: Vec<String>,
    outport_ids: Vec<String>,
}

enum Slot {
    Inport(Port),
    Outport(Port),
    Variable(Variable),
    Process(ProcessSlot),
}

impl Slot {
    fn node(&self) -> &dyn ActiveNode {
        match self {
            Slot::Inport(p) | Slot::Outport(p) => p,
            Slot::Variable(v) => v,
            Slot::Process(p) => p.node.as_ref(),
        }
    }

    fn node_mut(&mut self) -> &mut dyn ActiveNode {
        match self {
            Slot::Inport(p) | Slot::Outport(p) => p,
            Slot::Variable(v) => v,
            Slot::Process(p) => p.node.as_mut(),
        }
    }
}

pub struct GraphModel {
    identity: NodeIdentity,
    def: Arc<GraphModelDef>,
    proc: Process,
    slots: Vec<Slot>,
    // Model ports by model port id and by the owning process' port id
    inports: BTreeMap<String, usize>,
    inports_external: BTreeMap<String, usize>,
    outports: BTreeMap<String, usize>,
    outports_external: BTreeMap<String, usize>,
    variables: BTreeMap<String, usize>,
    process_ports: BTreeMap<String, usize>,
    connections: Vec<Connection>,
    order: Vec<usize>,
}

impl GraphModel {
    pub fn new(def: Arc<GraphModelDef>, proc: Process, parent: Option<&NodeIdentity>) -> Self {
        let label = proc.label.clone().or_else(|| def.label.clone()).unwrap_or_default();
        let identity = NodeIdentity::new(parent, proc.object_id.clone(), NodeType::GraphModel, def.object_id.clone(), label)
            .with_release(proc.release_nr);
        Self {
            identity,
            def,
            proc,
            slots: Vec::new(),
            inports: BTreeMap::new(),
            inports_external: BTreeMap::new(),
            outports: BTreeMap::new(),
            outports_external: BTreeMap::new(),
            variables: BTreeMap::new(),
            process_ports: BTreeMap::new(),
            connections: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        if self.identity.label.is_empty() { &self.def.object_id } else { &self.identity.label }
    }

    pub fn node_count(&self) -> usize {
        self.slots.len()
    }

    /// Process node ids of the scheduled nodes, in execution order.
    pub fn execution_order(&self) -> Vec<String> {
        self.order.iter().map(|&i| self.slots[i].node().identity().process_node_id.clone()).collect()
    }

    fn topology(&self, stage: &'static str, detail: String) -> SimError {
        SimError::Topology { model: self.label().to_string(), stage, detail }
    }

    /// Builds and wires every contained node, then registers the model.
    pub fn try_init(&mut self, env: &mut Environment) -> Result<()> {
        if self.identity.depth() > MAX_NESTING_DEPTH {
            return Err(self.topology("create processes", format!("nesting deeper than {}", MAX_NESTING_DEPTH)));
        }
        self.clear();
        self.create_inports(env)?;
        self.create_outports(env)?;
        self.create_processes(env)?;
        self.create_variables(env)?;
        self.create_connections()?;
        self.calculate_execution_order()?;

        let children = self.slots.iter().map(|s| s.node().identity().simulation_id.clone()).collect();
        env.register_node(&self.identity, Some(children));
        debug!(model = %self.label(), nodes = self.slots.len(), "graph model initialized");
        Ok(())
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.inports.clear();
        self.inports_external.clear();
        self.outports.clear();
        self.outports_external.clear();
        self.variables.clear();
        self.process_ports.clear();
        self.connections.clear();
        self.order.clear();
    }

    // --- Assembly ---

    /// Process ports in declaration order, followed by model ports the
    /// process does not declare (those stay unconnected from outside).
    fn port_bindings<'a, D>(
        declared: &'a BTreeMap<String, ProcessPort>,
        model_ports: &'a BTreeMap<String, D>,
    ) -> Vec<(String, ProcessPort)> {
        let mut bindings: Vec<(String, ProcessPort)> =
            declared.iter().map(|(k, pp)| (k.clone(), pp.clone())).collect();
        for id in model_ports.keys() {
            if !declared.values().any(|pp| pp.reference == *id) {
                bindings.push((id.clone(), ProcessPort::new(id.clone(), id.clone())));
            }
        }
        bindings
    }

    fn create_inports(&mut self, env: &mut Environment) -> Result<()> {
        let def = Arc::clone(&self.def);
        for (key, pp) in Self::port_bindings(&self.proc.inports, &def.inports) {
            let port_def: &InportDef = def
                .inports
                .get(&pp.reference)
                .ok_or_else(|| self.topology("create inports", format!("no inport '{}'", pp.reference)))?;
            let node_id = pp.node_id().to_string();
            let mut port = Port::inport(port_def.clone(), pp, &node_id, Some(&self.identity));
            if !port.init(env) {
                return Err(self.topology("create inports", format!("inport '{}' failed to initialize", key)));
            }
            let idx = self.slots.len();
            self.inports.insert(port.reference().to_string(), idx);
            self.inports_external.insert(key, idx);
            self.slots.push(Slot::Inport(port));
        }
        Ok(())
    }

    fn create_outports(&mut self, env: &mut Environment) -> Result<()> {
        let def = Arc::clone(&self.def);
        for (key, pp) in Self::port_bindings(&self.proc.outports, &def.outports) {
            let port_def: &OutportDef = def
                .outports
                .get(&pp.reference)
                .ok_or_else(|| self.topology("create outports", format!("no outport '{}'", pp.reference)))?;
            let node_id = pp.node_id().to_string();
            let mut port = Port::outport(port_def.clone(), pp, &node_id, Some(&self.identity));
            if !port.init(env) {
                return Err(self.topology("create outports", format!("outport '{}' failed to initialize", key)));
            }
            let idx = self.slots.len();
            self.outports.insert(port.reference().to_string(), idx);
            self.outports_external.insert(key, idx);
            self.slots.push(Slot::Outport(port));
        }
        Ok(())
    }

    fn create_processes(&mut self, env: &mut Environment) -> Result<()> {
        let def = Arc::clone(&self.def);
        for (key, process) in &def.processes {
            let mut node = env
                .build_process(process, &self.identity)
                .map_err(|e| self.topology("create processes", format!("'{}': {}", key, e)))?;
            if !node.init(env) {
                return Err(self.topology("create processes", format!("process '{}' failed to initialize", key)));
            }
            let idx = self.slots.len();
            for port_id in process.inports.keys().chain(process.outports.keys()) {
                self.process_ports.insert(port_id.clone(), idx);
            }
            self.slots.push(Slot::Process(ProcessSlot {
                node,
                inport_ids: process.inports.keys().cloned().collect(),
                outport_ids: process.outports.keys().cloned().collect(),
            }));
        }
        Ok(())
    }

    fn create_variables(&mut self, env: &mut Environment) -> Result<()> {
        let def = Arc::clone(&self.def);
        for (key, var_def) in &def.variables {
            let mut variable = Variable::new(key, var_def, Some(&self.identity));
            if !variable.init(env) {
                return Err(self.topology("create variables", format!("variable '{}' failed to initialize", key)));
            }
            self.variables.insert(key.clone(), self.slots.len());
            self.slots.push(Slot::Variable(variable));
        }
        Ok(())
    }

    fn resolves(&self, id: &str) -> bool {
        self.process_ports.contains_key(id)
            || self.inports.contains_key(id)
            || self.outports.contains_key(id)
            || self.variables.contains_key(id)
    }

    fn create_connections(&mut self) -> Result<()> {
        let def = Arc::clone(&self.def);
        for (key, c) in &def.connections {
            for endpoint in [&c.source, &c.destination] {
                if !self.resolves(endpoint) {
                    return Err(self.topology(
                        "create connections",
                        format!("connection '{}' references unknown port '{}'", key, endpoint),
                    ));
                }
            }
            self.connections.push(c.clone());
        }
        Ok(())
    }

    /// Slot feeding `port_id` through each connection ending there.
    fn upstream_slots(&self, port_id: &str) -> Vec<usize> {
        let mut upstream = Vec::new();
        for c in self.connections.iter().filter(|c| c.destination == port_id) {
            let source = self
                .variables
                .get(&c.source)
                .or_else(|| self.inports.get(&c.source))
                .copied()
                .or_else(|| {
                    self.process_ports.get(&c.source).copied().filter(|&i| {
                        matches!(&self.slots[i], Slot::Process(p) if p.outport_ids.contains(&c.source))
                    })
                });
            if let Some(idx) = source {
                if !upstream.contains(&idx) {
                    upstream.push(idx);
                }
            }
        }
        upstream
    }

    fn calculate_execution_order(&mut self) -> Result<()> {
        // 1. Schedule inports, processes, variables, then outports
        let mut sched: Vec<usize> = Vec::with_capacity(self.slots.len());
        for kind in 0..4 {
            for (i, slot) in self.slots.iter().enumerate() {
                let rank = match slot {
                    Slot::Inport(_) => 0,
                    Slot::Process(_) => 1,
                    Slot::Variable(_) => 2,
                    Slot::Outport(_) => 3,
                };
                if rank == kind {
                    sched.push(i);
                }
            }
        }

        // 2. Dependencies from the connections ending at each node
        let mut nodes: Vec<ScheduledNode> = Vec::with_capacity(sched.len());
        for &slot_idx in &sched {
            let slot = &self.slots[slot_idx];
            let mut node = ScheduledNode::new(slot.node().identity().process_node_id.clone());
            let upstream: Vec<usize> = match slot {
                Slot::Inport(_) => Vec::new(),
                Slot::Process(p) => p.inport_ids.iter().flat_map(|id| self.upstream_slots(id)).collect(),
                Slot::Variable(v) => self.upstream_slots(&v.identity().process_node_id),
                Slot::Outport(p) => self.upstream_slots(p.reference()),
            };
            for up in upstream {
                if let Some(pos) = sched.iter().position(|&s| s == up) {
                    node.depends_on(pos);
                }
            }
            nodes.push(node);
        }

        // 3. Kahn
        let order = execution_order(self.label(), &nodes)?;
        self.order = order.into_iter().map(|pos| sched[pos]).collect();
        Ok(())
    }

    // --- Propagation ---

    fn push_load(&mut self, source: &str, load: &Param) {
        let destinations: Vec<String> = self
            .connections
            .iter()
            .filter(|c| c.source == source)
            .map(|c| c.destination.clone())
            .collect();
        for dest in destinations {
            if let Some(&i) = self.process_ports.get(&dest) {
                self.slots[i].node_mut().accept_load(load.clone(), Some(&dest));
            } else if let Some(&i) = self.variables.get(&dest).or_else(|| self.outports.get(&dest)) {
                self.slots[i].node_mut().accept_load(load.clone(), None);
            }
        }
    }

    fn push_response(&mut self, destination: &str, response: &[ResponseParam]) {
        let sources: Vec<String> = self
            .connections
            .iter()
            .filter(|c| c.destination == destination)
            .map(|c| c.source.clone())
            .collect();
        for src in sources {
            if let Some(&i) = self.process_ports.get(&src) {
                self.slots[i].node_mut().accept_response(response.to_vec(), Some(&src));
            } else if let Some(&i) = self.variables.get(&src).or_else(|| self.inports.get(&src)) {
                self.slots[i].node_mut().accept_response(response.to_vec(), None);
            }
        }
    }

    fn external_inport(&self, port: Option<&str>) -> Option<usize> {
        let id = port?;
        self.inports.get(id).or_else(|| self.inports_external.get(id)).copied()
    }

    fn external_outport(&self, port: Option<&str>) -> Option<usize> {
        let id = port?;
        self.outports.get(id).or_else(|| self.outports_external.get(id)).copied()
    }
}

impl Lifecycle for GraphModel {
    fn init(&mut self, env: &mut Environment) -> bool {
        match self.try_init(env) {
            Ok(()) => true,
            Err(e) => {
                warn!(model = %self.label(), error = %e, "graph model init failed");
                false
            }
        }
    }

    fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.node_mut().reset();
        }
    }

    fn process(&mut self, env: &mut Environment) {
        env.push_exec_stack(&self.identity);
        for pos in 0..self.order.len() {
            let idx = self.order[pos];
            let slot = &mut self.slots[idx];
            slot.node_mut().process(env);
            let emitted: Vec<(String, Param)> = match &*slot {
                Slot::Process(p) => p
                    .outport_ids
                    .iter()
                    .filter_map(|id| p.node.yield_load(Some(id)).map(|l| (id.clone(), l.clone())))
                    .collect(),
                Slot::Variable(v) => {
                    v.yield_load(None).map(|l| (v.identity().process_node_id.clone(), l.clone())).into_iter().collect()
                }
                Slot::Inport(p) => p.yield_load(None).map(|l| (p.reference().to_string(), l.clone())).into_iter().collect(),
                Slot::Outport(_) => Vec::new(),
            };
            for (source, load) in &emitted {
                self.push_load(source, load);
            }
        }
        env.pop_exec_stack();
    }
}

impl ActiveNode for GraphModel {
    fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    fn accept_load(&mut self, load: Param, port: Option<&str>) {
        if let Some(i) = self.external_inport(port) {
            self.slots[i].node_mut().accept_load(load, None);
        }
    }

    fn yield_load(&self, port: Option<&str>) -> Option<&Param> {
        self.external_outport(port).and_then(|i| self.slots[i].node().yield_load(None))
    }

    fn accept_response(&mut self, response: Vec<ResponseParam>, port: Option<&str>) {
        if let Some(i) = self.external_outport(port) {
            self.slots[i].node_mut().accept_response(response, None);
        }
    }

    fn process_response(&mut self, env: &mut Environment) {
        env.push_exec_stack(&self.identity);
        for pos in (0..self.order.len()).rev() {
            let idx = self.order[pos];
            let slot = &mut self.slots[idx];
            slot.node_mut().process_response(env);
            let emitted: Vec<(String, Vec<ResponseParam>)> = match &*slot {
                Slot::Process(p) => p
                    .inport_ids
                    .iter()
                    .filter_map(|id| p.node.yield_response(Some(id)).map(|r| (id.clone(), r.clone())))
                    .collect(),
                Slot::Variable(v) => v
                    .yield_response(None)
                    .map(|r| (v.identity().process_node_id.clone(), r.clone()))
                    .into_iter()
                    .collect(),
                Slot::Outport(p) => {
                    p.yield_response(None).map(|r| (p.reference().to_string(), r.clone())).into_iter().collect()
                }
                Slot::Inport(_) => Vec::new(),
            };
            for (destination, response) in &emitted {
                self.push_response(destination, response);
            }
        }
        env.pop_exec_stack();
    }

    fn yield_response(&self, port: Option<&str>) -> Option<&Vec<ResponseParam>> {
        self.external_inport(port).and_then(|i| self.slots[i].node().yield_response(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::graph::{GeneratesResponse, ProcessType};
    use crate::elements::{sum, ElementRegistry};
    use crate::simulation::resolver::GraphModelLibrary;

    fn sum_process(id: &str) -> Process {
        let mut p = Process::new(id, ProcessType::ProcessingElement, sum::ID);
        for r in [sum::IN_A, sum::IN_B] {
            let key = format!("{}-{}", id, r);
            p.inports.insert(key.clone(), ProcessPort::new(key, r));
        }
        let key = format!("{}-{}", id, sum::OUT);
        p.outports.insert(key.clone(), ProcessPort::new(key, sum::OUT));
        p
    }

    fn model(id: &str, processes: Vec<Process>, connections: &[(&str, &str)]) -> GraphModelDef {
        let mut def = GraphModelDef { object_id: id.into(), label: Some(id.to_uppercase()), ..Default::default() };
        def.inports.insert("i1".into(), InportDef::new("i1", "In", GeneratesResponse::Passthrough));
        def.outports.insert("o1".into(), OutportDef::new("o1", "Out"));
        for p in processes {
            def.processes.insert(p.object_id.clone(), p);
        }
        for (src, dst) in connections {
            let c = Connection::new(*src, *dst);
            def.connections.insert(c.object_id.clone(), c);
        }
        def
    }

    /// Sums `i1` with itself.
    fn doubler(id: &str) -> GraphModelDef {
        model(id, vec![sum_process("p")], &[("i1", "p-in-a"), ("i1", "p-in-b"), ("p-out", "o1")])
    }

    fn root_process(def: &GraphModelDef) -> Process {
        let mut p = Process::new("root", ProcessType::GraphModel, def.object_id.clone());
        p.inports.insert("i1".into(), ProcessPort::new("i1", "i1"));
        p.outports.insert("o1".into(), ProcessPort::new("o1", "o1"));
        p
    }

    fn env_with(models: GraphModelLibrary) -> Environment {
        Environment::new(Arc::new(ElementRegistry::builtin()), Arc::new(models), 0)
    }

    fn run_once(gm: &mut GraphModel, env: &mut Environment, value: f64) -> Option<f64> {
        env.begin_pass("s", "2024-01", None, 0);
        gm.reset();
        gm.accept_load(Param::number(value), Some("i1"));
        gm.process(env);
        gm.process_response(env);
        gm.yield_load(Some("o1")).and_then(Param::as_number).map(|n| n.value)
    }

    #[test]
    fn test_chain_is_ordered_by_dependencies() {
        let def = model(
            "gm",
            vec![sum_process("b"), sum_process("c"), sum_process("a")],
            &[
                ("i1", "a-in-a"),
                ("i1", "a-in-b"),
                ("a-out", "b-in-a"),
                ("a-out", "b-in-b"),
                ("b-out", "c-in-a"),
                ("b-out", "c-in-b"),
                ("c-out", "o1"),
            ],
        );
        let mut env = env_with(GraphModelLibrary::new());
        let mut gm = GraphModel::new(Arc::new(def.clone()), root_process(&def), None);
        gm.try_init(&mut env).unwrap();

        let order = gm.execution_order();
        let pos = |id: &str| order.iter().position(|o| o == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
        assert!(pos("c") < pos("o1"));
        assert_eq!(run_once(&mut gm, &mut env, 1.0), Some(8.0));
    }

    #[test]
    fn test_back_edge_fails_init() {
        let def = model(
            "gm",
            vec![sum_process("a"), sum_process("b"), sum_process("c")],
            &[("a-out", "b-in-a"), ("b-out", "c-in-a"), ("c-out", "a-in-a")],
        );
        let mut env = env_with(GraphModelLibrary::new());
        let mut gm = GraphModel::new(Arc::new(def.clone()), root_process(&def), None);
        match gm.try_init(&mut env) {
            Err(SimError::CycleDetected { model, nodes }) => {
                assert_eq!(model, "GM");
                assert_eq!(nodes.len(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!gm.init(&mut env));
    }

    #[test]
    fn test_unknown_connection_endpoint_fails_init() {
        let def = model("gm", vec![sum_process("a")], &[("i1", "nowhere")]);
        let mut env = env_with(GraphModelLibrary::new());
        let mut gm = GraphModel::new(Arc::new(def.clone()), root_process(&def), None);
        match gm.try_init(&mut env) {
            Err(SimError::Topology { stage, detail, .. }) => {
                assert_eq!(stage, "create connections");
                assert!(detail.contains("nowhere"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_nested_models_get_distinct_nodes() {
        let mut library = GraphModelLibrary::new();
        library.insert("latest", doubler("child"));
        let mut nested = Vec::new();
        for id in ["x", "y"] {
            let mut p = Process::new(id, ProcessType::GraphModel, "child");
            p.inports.insert(format!("{}-in", id), ProcessPort::new(format!("{}-in", id), "i1"));
            p.outports.insert(format!("{}-out", id), ProcessPort::new(format!("{}-out", id), "o1"));
            nested.push(p);
        }
        // x doubles the input, y doubles x
        let def = model("gm", nested, &[("i1", "x-in"), ("x-out", "y-in"), ("y-out", "o1")]);
        let mut env = env_with(library);
        let mut gm = GraphModel::new(Arc::new(def.clone()), root_process(&def), None);
        gm.try_init(&mut env).unwrap();

        assert_eq!(run_once(&mut gm, &mut env, 3.0), Some(12.0));
        let children: Vec<&str> = env
            .store()
            .iter()
            .filter(|n| n.node_type == NodeType::GraphModel && n.object_id != gm.identity().simulation_id)
            .map(|n| n.object_id.as_str())
            .collect();
        assert_eq!(children.len(), 2);
        assert_ne!(children[0], children[1]);
        // reset clears every buffer down the tree
        gm.reset();
        assert!(gm.yield_load(Some("o1")).is_none());
    }
}
