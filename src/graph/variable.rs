//! Named and broadcast variables: fan-out points inside a graph model.

use crate::config::graph::{VariableDef, VariableKind};
use crate::graph::lifecycle::{ActiveNode, Lifecycle};
use crate::graph::node::{NodeIdentity, NodeType};
use crate::graph::port::{NodeBuffers, ResponsePolicy};
use crate::param::Param;
use crate::response::ResponseParam;
use crate::simulation::environment::Environment;

/// Buffers like a port, but mixes the responses of its consumers instead of
/// letting the worst one dominate.
#[derive(Debug, Clone)]
pub struct Variable {
    identity: NodeIdentity,
    buffers: NodeBuffers,
}

impl Variable {
    pub fn new(key: &str, def: &VariableDef, parent: Option<&NodeIdentity>) -> Self {
        let node_type = match def.kind {
            VariableKind::NamedVariable => NodeType::NamedVariable,
            VariableKind::BroadcastVariable => NodeType::BroadcastVariable,
        };
        Self {
            identity: NodeIdentity::new(parent, key, node_type, key, def.label.clone()),
            buffers: NodeBuffers::default(),
        }
    }
}

impl Lifecycle for Variable {
    fn init(&mut self, env: &mut Environment) -> bool {
        env.register_node(&self.identity, None);
        true
    }

    fn reset(&mut self) {
        self.buffers.reset();
    }

    fn process(&mut self, env: &mut Environment) {
        env.push_exec_stack(&self.identity);
        if let Some(load) = self.buffers.aggregate_load() {
            env.store_raw_data(&self.identity, load.clone().into());
        }
        env.pop_exec_stack();
    }
}

impl ActiveNode for Variable {
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
        self.buffers.combine_responses(ResponsePolicy::Combine);
        env.pop_exec_stack();
    }

    fn yield_response(&self, _port: Option<&str>) -> Option<&Vec<ResponseParam>> {
        self.buffers.response.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::testing::{env, root};
    use crate::response::types::dist;

    #[test]
    fn test_passes_leave_enclosing_frames_intact() {
        let mut env = env();
        let model = root();
        let def = VariableDef { object_id: "v".into(), label: "Users".into(), ..Default::default() };
        let mut variable = Variable::new("v", &def, Some(&model));
        variable.init(&mut env);
        env.push_exec_stack(&model);

        variable.accept_load(Param::number(2.0), None);
        variable.accept_load(Param::number(3.0), None);
        variable.process(&mut env);
        assert_eq!(variable.yield_load(None), Some(&Param::number(5.0)));

        variable.accept_response(vec![ResponseParam::new("latency", "ms", dist(&[(10.0, 1000.0)]))], None);
        variable.accept_response(vec![ResponseParam::new("latency", "ms", dist(&[(30.0, 1000.0)]))], None);
        variable.process_response(&mut env);
        assert_eq!(variable.yield_response(None).unwrap()[0].value, dist(&[(10.0, 500.0), (30.0, 500.0)]));

        assert_eq!(env.exec_stack().len(), 1);
        assert_eq!(env.exec_stack()[0].node_id, model.simulation_id);
    }
}
