//! environment.rs
//! Per-scenario run state threaded through every lifecycle call: the node
//! store, the execution stack, the pass cursor and the random stream.

use crate::config::graph::{Process, ProcessType};
use crate::elements::ElementRegistry;
use crate::error::{Result, SimError, SimulationStage};
use crate::graph::lifecycle::ActiveNode;
use crate::graph::model::GraphModel;
use crate::graph::node::NodeIdentity;
use crate::response::ResponseParam;
use crate::simulation::resolver::GraphModelLibrary;
use crate::store::{NodeFact, NodeStore, RuntimeMessage, StackFrame, StepCursor};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tracing::debug;

pub struct Environment {
    elements: Arc<ElementRegistry>,
    models: Arc<GraphModelLibrary>,
    store: NodeStore,
    exec_stack: Vec<StackFrame>,
    cursor: StepCursor,
    stage: SimulationStage,
    seed: u64,
    rng: ChaCha8Rng,
}

impl Environment {
    pub fn new(elements: Arc<ElementRegistry>, models: Arc<GraphModelLibrary>, seed: u64) -> Self {
        Self {
            elements,
            models,
            store: NodeStore::new(),
            exec_stack: Vec::new(),
            cursor: StepCursor::default(),
            stage: SimulationStage::Setup,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn stage(&self) -> SimulationStage {
        self.stage
    }

    pub fn set_stage(&mut self, stage: SimulationStage) {
        self.stage = stage;
    }

    pub fn cursor(&self) -> &StepCursor {
        &self.cursor
    }

    pub fn current_date(&self) -> &str {
        &self.cursor.step_date
    }

    /// True while a Monte Carlo trial (not the mean pass) is running.
    pub fn is_monte_carlo(&self) -> bool {
        self.cursor.mc_run.is_some()
    }

    /// Moves the cursor to a new pass and reseeds the random stream.
    ///
    /// Every pass draws from its own ChaCha stream under the run seed, so a
    /// trial's samples do not depend on which passes ran before it.
    pub fn begin_pass(&mut self, scenario_id: &str, step_date: &str, mc_run: Option<u32>, stream: u64) {
        self.cursor = StepCursor {
            scenario_id: scenario_id.to_string(),
            step_date: step_date.to_string(),
            mc_run,
        };
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.rng.set_stream(stream);
        self.exec_stack.clear();
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    // --- Node construction ---

    /// Builds the node for `process`: a nested model from the library or a
    /// processing element from the registry.
    pub fn build_process(&self, process: &Process, parent: &NodeIdentity) -> Result<Box<dyn ActiveNode>> {
        match process.process_type {
            ProcessType::GraphModel => {
                let version = process.version();
                let def = self.models.get(&process.reference, &version).ok_or_else(|| SimError::UnknownModel {
                    id: process.reference.clone(),
                    version: version.clone(),
                })?;
                Ok(Box::new(GraphModel::new(def, process.clone(), Some(parent))))
            }
            ProcessType::ProcessingElement => self.elements.build(process, parent),
        }
    }

    pub fn register_node(&mut self, identity: &NodeIdentity, children: Option<Vec<String>>) {
        self.store.register(identity.to_simulation_node(children));
    }

    // --- Facts and warnings ---

    pub fn store_raw_data(&mut self, sender: &NodeIdentity, fact: NodeFact) {
        self.store.store_raw_data(&sender.simulation_id, &self.cursor, fact);
    }

    pub fn store_raw_responses(&mut self, sender: &NodeIdentity, responses: &[ResponseParam]) {
        self.store.store_raw_responses(&sender.simulation_id, &self.cursor, responses);
    }

    /// Records a warning against `sender` with the current execution context.
    pub fn warn(&mut self, sender: &NodeIdentity, code: &str, desc: Option<String>, inhibit_dedup: bool) {
        let message = RuntimeMessage {
            code: code.to_string(),
            node_id: Some(sender.simulation_id.clone()),
            stage: SimulationStage::Simulation,
            stack: self.exec_stack.clone(),
            date: Some(self.cursor.step_date.clone()),
            scenario_id: Some(self.cursor.scenario_id.clone()),
            desc,
            inhibit_dedup,
        };
        if self.store.warn(message) {
            debug!(node = %sender.label, code, "warning recorded");
        }
    }

    // --- Execution stack ---

    pub fn push_exec_stack(&mut self, node: &NodeIdentity) {
        self.exec_stack.push(StackFrame { node_id: node.simulation_id.clone(), name: node.label.clone() });
    }

    pub fn pop_exec_stack(&mut self) {
        self.exec_stack.pop();
    }

    pub fn exec_stack(&self) -> &[StackFrame] {
        &self.exec_stack
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn into_store(self) -> NodeStore {
        self.store
    }
}
