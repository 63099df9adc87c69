//! The contract every active node of the graph implements.

use crate::graph::node::NodeIdentity;
use crate::param::Param;
use crate::response::ResponseParam;
use crate::simulation::environment::Environment;

pub trait Lifecycle {
    /// Wires the node up once and registers it. `false` means the node
    /// cannot take part in the run.
    fn init(&mut self, env: &mut Environment) -> bool;
    /// Clears per-pass buffers.
    fn reset(&mut self);
    fn process(&mut self, env: &mut Environment);
    fn post_process(&mut self, _env: &mut Environment) {}
    fn finalize(&mut self, _env: &mut Environment) {}
}

/// A node that takes part in load and response propagation.
///
/// `port` selects a port on nodes that have several (processes); single
/// buffer nodes ignore it.
pub trait ActiveNode: Lifecycle {
    fn identity(&self) -> &NodeIdentity;
    fn accept_load(&mut self, load: Param, port: Option<&str>);
    fn yield_load(&self, port: Option<&str>) -> Option<&Param>;
    fn accept_response(&mut self, response: Vec<ResponseParam>, port: Option<&str>);
    fn process_response(&mut self, env: &mut Environment);
    fn yield_response(&self, port: Option<&str>) -> Option<&Vec<ResponseParam>>;
}
