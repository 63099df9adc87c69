//! Processing elements: leaf behaviors plugged into graph models by id.
//!
//! An element is a `ProcessingElement` node (identity plus `PortSet`) driving
//! an `ElementBehavior`. The `ElementRegistry` maps interface description
//! ids to the description and a factory for the behavior.

pub mod add_hop;
pub mod add_latency;
pub mod message;
pub mod min_max;
pub mod multiply;
pub mod ports;
pub mod serial_execution;
pub mod sum;

pub use ports::PortSet;

use crate::config::graph::{Process, ProcessInterfaceDescription, ProcessType};
use crate::error::{Result, SimError};
use crate::graph::lifecycle::{ActiveNode, Lifecycle};
use crate::graph::node::{NodeIdentity, NodeType};
use crate::param::Param;
use crate::response::ResponseParam;
use crate::simulation::environment::Environment;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Warning code recorded when an element cannot compute its output.
pub const CALCULATION_FAILED: &str = "CALCULATION_FAILED";

/// What a specific element does with the loads and responses on its ports.
///
/// Inports are processed before `process` runs. Errors are contained by the
/// owning `ProcessingElement`: the affected output is skipped.
pub trait ElementBehavior: Send {
    /// Sees every load as it arrives, before any processing.
    fn on_load(&mut self, _port: &str, _load: &Param) {}

    fn process(&mut self, ports: &mut PortSet, node: &NodeIdentity, env: &mut Environment) -> Result<()>;

    fn process_response(&mut self, ports: &mut PortSet, _node: &NodeIdentity, env: &mut Environment) -> Result<()> {
        ports.default_response(env);
        Ok(())
    }

    fn reset(&mut self) {}
}

pub struct ProcessingElement {
    identity: NodeIdentity,
    ports: PortSet,
    behavior: Box<dyn ElementBehavior>,
}

impl ProcessingElement {
    pub fn new(
        process: &Process,
        desc: &ProcessInterfaceDescription,
        behavior: Box<dyn ElementBehavior>,
        parent: Option<&NodeIdentity>,
    ) -> Result<Self> {
        let label = process.label.clone().unwrap_or_else(|| desc.name.clone());
        let identity = NodeIdentity::new(
            parent,
            process.object_id.clone(),
            NodeType::ProcessingElement,
            process.reference.clone(),
            label,
        )
        .with_release(process.release_nr);
        let ports = PortSet::build(process, desc, &identity)?;
        Ok(Self { identity, ports, behavior })
    }

    pub fn ports(&self) -> &PortSet {
        &self.ports
    }

    fn contain(&self, env: &mut Environment, step: &str, result: Result<()>) {
        if let Err(e) = result {
            warn!(element = %self.identity.label, step, error = %e, "element computation failed");
            env.warn(&self.identity, CALCULATION_FAILED, Some(format!("failed to {}: {}", step, e)), false);
        }
    }
}

impl Lifecycle for ProcessingElement {
    fn init(&mut self, env: &mut Environment) -> bool {
        if !self.ports.init(env) {
            return false;
        }
        env.register_node(&self.identity, Some(self.ports.child_ids()));
        true
    }

    fn reset(&mut self) {
        self.ports.reset();
        self.behavior.reset();
    }

    fn process(&mut self, env: &mut Environment) {
        env.push_exec_stack(&self.identity);
        self.ports.process_inports(env);
        let result = self.behavior.process(&mut self.ports, &self.identity, env);
        self.contain(env, "process load", result);
        env.pop_exec_stack();
    }

    fn post_process(&mut self, env: &mut Environment) {
        self.ports.post_process(env);
    }
}

impl ActiveNode for ProcessingElement {
    fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    fn accept_load(&mut self, load: Param, port: Option<&str>) {
        if let Some(idx) = self.ports.find_external_first(port) {
            let reference = self.ports.port(idx).reference().to_string();
            self.behavior.on_load(&reference, &load);
            self.ports.port_mut(idx).accept_load(load, None);
        }
    }

    fn yield_load(&self, port: Option<&str>) -> Option<&Param> {
        self.ports.find_internal_first(port).and_then(|idx| self.ports.load(idx))
    }

    fn accept_response(&mut self, response: Vec<ResponseParam>, port: Option<&str>) {
        if let Some(idx) = self.ports.find_external_first(port) {
            self.ports.port_mut(idx).accept_response(response, None);
        }
    }

    fn process_response(&mut self, env: &mut Environment) {
        env.push_exec_stack(&self.identity);
        let result = self.behavior.process_response(&mut self.ports, &self.identity, env);
        self.contain(env, "process response", result);
        env.pop_exec_stack();
    }

    fn yield_response(&self, port: Option<&str>) -> Option<&Vec<ResponseParam>> {
        self.ports.find_external_first(port).and_then(|idx| self.ports.port(idx).yield_response(None))
    }
}

// --- Registry ---

pub type ElementFactory = fn(&Process) -> Box<dyn ElementBehavior>;

struct ElementEntry {
    description: Arc<ProcessInterfaceDescription>,
    factory: ElementFactory,
}

/// Processing elements by interface description id.
pub struct ElementRegistry {
    entries: BTreeMap<String, ElementEntry>,
}

impl ElementRegistry {
    /// A registry without any element.
    pub fn empty() -> Self {
        Self { entries: BTreeMap::new() }
    }

    /// A registry holding every built-in element.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(sum::description(), sum::factory);
        registry.register(multiply::description(), multiply::factory);
        registry.register(min_max::min_description(), min_max::min_factory);
        registry.register(min_max::max_description(), min_max::max_factory);
        registry.register(min_max::max_weighted_description(), min_max::max_weighted_factory);
        registry.register(add_hop::description(), add_hop::factory);
        registry.register(add_latency::description(), add_latency::factory);
        registry.register(serial_execution::description(), serial_execution::factory);
        registry.register(message::warning_description(), message::warning_factory);
        registry.register(message::error_description(), message::error_factory);
        registry
    }

    /// Adds or replaces the element registered under `description.object_id`.
    pub fn register(&mut self, description: ProcessInterfaceDescription, factory: ElementFactory) {
        let entry = ElementEntry { description: Arc::new(description), factory };
        self.entries.insert(entry.description.object_id.clone(), entry);
    }

    pub fn description(&self, id: &str) -> Option<&ProcessInterfaceDescription> {
        self.entries.get(id).map(|e| e.description.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn build(&self, process: &Process, parent: &NodeIdentity) -> Result<Box<dyn ActiveNode>> {
        if process.process_type != ProcessType::ProcessingElement {
            return Err(SimError::UnknownProcessType(process.object_id.clone()));
        }
        let entry = self
            .entries
            .get(&process.reference)
            .ok_or_else(|| SimError::UnknownElement(process.reference.clone()))?;
        let element = ProcessingElement::new(process, &entry.description, (entry.factory)(process), Some(parent))?;
        Ok(Box::new(element))
    }
}

impl Default for ElementRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
