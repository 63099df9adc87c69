//! port.rs
//! Buffering shared by ports and variables, and the in/out ports themselves.

use crate::config::graph::{GeneratesResponse, InportDef, OutportDef, ProcessPort};
use crate::graph::lifecycle::{ActiveNode, Lifecycle};
use crate::graph::node::{NodeIdentity, NodeType};
use crate::param::load_ops::aggregate_params;
use crate::param::{Aspect, NumberParam, Param};
use crate::response::{combine_response_groups, max_response_groups, ResponseParam};
use crate::simulation::environment::Environment;

/// How a node folds the response groups it accepted into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePolicy {
    /// The worst branch dominates.
    Max,
    /// Branches are independent consumers and get mixed.
    Combine,
}

/// Per-pass load and response buffers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeBuffers {
    pub input_load: Vec<Param>,
    pub load: Option<Param>,
    pub input_response: Vec<Vec<ResponseParam>>,
    pub response: Option<Vec<ResponseParam>>,
}

impl NodeBuffers {
    pub fn reset(&mut self) {
        self.input_load.clear();
        self.load = None;
        self.input_response.clear();
        self.response = None;
    }

    pub fn accept_load(&mut self, load: Param) {
        self.input_load.push(load);
    }

    pub fn accept_response(&mut self, response: Vec<ResponseParam>) {
        self.input_response.push(response);
    }

    /// Aggregates the accepted loads, keeping the previous load when nothing arrived.
    pub fn aggregate_load(&mut self) -> Option<&Param> {
        if !self.input_load.is_empty() {
            self.load = aggregate_params(&self.input_load);
        }
        self.load.as_ref()
    }

    pub fn combine_responses(&mut self, policy: ResponsePolicy) -> Option<&Vec<ResponseParam>> {
        if !self.input_response.is_empty() {
            self.response = Some(match policy {
                ResponsePolicy::Max => max_response_groups(&self.input_response),
                ResponsePolicy::Combine => combine_response_groups(&self.input_response),
            });
        }
        self.response.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PortKind {
    Inport(InportDef),
    Outport(OutportDef),
}

/// An inport or outport of a process.
#[derive(Debug, Clone)]
pub struct Port {
    identity: NodeIdentity,
    pub process_port: ProcessPort,
    pub kind: PortKind,
    pub buffers: NodeBuffers,
}

/// Reported form of an aspect load: a number equal to the absolute slice
/// total, carrying the non-zero slices.
fn aspect_as_number(aspect: &Aspect) -> Param {
    let slices: Vec<(String, f64)> = aspect
        .slices
        .iter()
        .filter(|(_, v)| **v != 0.0)
        .map(|(k, v)| (k.clone(), *v))
        .collect();
    let value = slices.iter().map(|(_, v)| v.abs()).sum();
    let reported = Aspect { name: aspect.name.clone(), relative: false, slices: slices.into_iter().collect() };
    Param::Number(NumberParam::new(value).with_aspects(vec![reported]))
}

impl Port {
    pub fn inport(def: InportDef, process_port: ProcessPort, process_node_id: &str, parent: Option<&NodeIdentity>) -> Self {
        let identity = NodeIdentity::new(
            parent,
            process_node_id,
            NodeType::ProcessInport,
            process_port.reference.clone(),
            def.name.clone(),
        );
        Self { identity, process_port, kind: PortKind::Inport(def), buffers: NodeBuffers::default() }
    }

    pub fn outport(def: OutportDef, process_port: ProcessPort, process_node_id: &str, parent: Option<&NodeIdentity>) -> Self {
        let identity = NodeIdentity::new(
            parent,
            process_node_id,
            NodeType::ProcessOutport,
            process_port.reference.clone(),
            def.name.clone(),
        );
        Self { identity, process_port, kind: PortKind::Outport(def), buffers: NodeBuffers::default() }
    }

    pub fn is_inport(&self) -> bool {
        matches!(self.kind, PortKind::Inport(_))
    }

    /// Interface port this port realizes.
    pub fn reference(&self) -> &str {
        &self.process_port.reference
    }

    pub fn generates_response(&self) -> GeneratesResponse {
        match &self.kind {
            PortKind::Inport(def) => def.generates_response,
            PortKind::Outport(_) => GeneratesResponse::Always,
        }
    }

    /// Records a warning against this port with the port on the exec stack.
    pub fn warn(&self, env: &mut Environment, code: &str, desc: impl Into<String>) {
        env.push_exec_stack(&self.identity);
        env.warn(&self.identity, code, Some(desc.into()), false);
        env.pop_exec_stack();
    }
}

impl Lifecycle for Port {
    fn init(&mut self, env: &mut Environment) -> bool {
        env.register_node(&self.identity, None);
        true
    }

    fn reset(&mut self) {
        self.buffers.reset();
    }

    fn process(&mut self, env: &mut Environment) {
        env.push_exec_stack(&self.identity);
        self.buffers.aggregate_load();
        match &self.kind {
            PortKind::Inport(def) => {
                if self.buffers.load.is_none() {
                    self.buffers.load = self.process_port.param.clone().or_else(|| def.default_param.clone());
                }
                match &self.buffers.load {
                    Some(Param::Aspect { value }) => env.store_raw_data(&self.identity, aspect_as_number(value).into()),
                    Some(load) => env.store_raw_data(&self.identity, load.clone().into()),
                    None => {}
                }
            }
            PortKind::Outport(_) => {
                if let Some(load) = &self.buffers.load {
                    env.store_raw_data(&self.identity, load.clone().into());
                }
            }
        }
        env.pop_exec_stack();
    }
}

impl ActiveNode for Port {
    fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    fn accept_load(&mut self, load: Param, _port: Option<&str>) {
        self.buffers.accept_load(load);
    }

    fn yield_load(&self, _port: Option<&str>) -> Option<&Param> {
        self.buffers.load.as_ref()
    }

    fn accept_response(&mut self, response: Vec<ResponseParam>, _port: Option<&str>) {
        self.buffers.accept_response(response);
    }

    fn process_response(&mut self, env: &mut Environment) {
        env.push_exec_stack(&self.identity);
        if let Some(response) = self.buffers.combine_responses(ResponsePolicy::Max) {
            env.store_raw_responses(&self.identity, response);
        }
        env.pop_exec_stack();
    }

    fn yield_response(&self, _port: Option<&str>) -> Option<&Vec<ResponseParam>> {
        self.buffers.response.as_ref()
    }
}
