//! add_hop.rs
//! Passes the load through and counts one network hop in the response.

use crate::config::graph::{GeneratesResponse, InportDef, OutportDef, Process, ProcessInterfaceDescription};
use crate::elements::{ElementBehavior, PortSet};
use crate::error::Result;
use crate::graph::node::NodeIdentity;
use crate::response::add_response_groups;
use crate::response::ops::make_hop_response;
use crate::simulation::environment::Environment;

pub const ID: &str = "add-hop";
pub const IN: &str = "in";
pub const OUT: &str = "out";

pub fn description() -> ProcessInterfaceDescription {
    ProcessInterfaceDescription::new(ID, "Add Hop")
        .inport(InportDef::new(IN, "In", GeneratesResponse::Always))
        .outport(OutportDef::new(OUT, "Out"))
}

pub fn factory(_: &Process) -> Box<dyn ElementBehavior> {
    Box::new(AddHop)
}

pub struct AddHop;

impl ElementBehavior for AddHop {
    fn process(&mut self, ports: &mut PortSet, _node: &NodeIdentity, env: &mut Environment) -> Result<()> {
        let load = ports.load_of(IN).cloned();
        if let (Some(load), Some(out)) = (load, ports.static_port(OUT)) {
            ports.emit(out, load, env);
        }
        Ok(())
    }

    fn process_response(&mut self, ports: &mut PortSet, _node: &NodeIdentity, env: &mut Environment) -> Result<()> {
        let downstream = match ports.static_port(OUT) {
            Some(out) => ports.outport_response(out, env).filter(|r| !r.is_empty()),
            None => None,
        };
        let hop = vec![make_hop_response(1.0, &[])];
        let response = match downstream {
            Some(downstream) => add_response_groups(&[hop, downstream]),
            None => hop,
        };
        if let Some(inport) = ports.static_port(IN) {
            ports.deliver_response(inport, response, env);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::testing::*;
    use crate::param::Param;
    use crate::response::types::{dist, HOP_CATEGORY, LATENCY_CATEGORY};
    use crate::response::ResponseParam;

    #[test]
    fn test_load_passes_through() {
        let mut env = env();
        let mut node = build(&process(ID, None, 0), &mut env);
        run(node.as_mut(), &mut env, &[(IN, Param::number(7.0))], None);
        assert_eq!(node.yield_load(Some(OUT)), Some(&Param::number(7.0)));
    }

    #[test]
    fn test_single_hop_without_downstream() {
        let mut env = env();
        let mut node = build(&process(ID, None, 0), &mut env);
        run(node.as_mut(), &mut env, &[(IN, Param::number(1.0))], None);
        node.process_response(&mut env);
        let response = node.yield_response(Some(IN)).unwrap();
        assert_eq!(response.len(), 1);
        assert_eq!(response[0].category, HOP_CATEGORY);
        assert_eq!(response[0].value, dist(&[(1.0, 1000.0)]));
    }

    #[test]
    fn test_hops_add_up_and_other_categories_pass() {
        let mut env = env();
        let mut node = build(&process(ID, None, 0), &mut env);
        run(node.as_mut(), &mut env, &[(IN, Param::number(1.0))], None);
        let downstream = vec![
            ResponseParam::new(HOP_CATEGORY, "", dist(&[(2.0, 1000.0)])),
            ResponseParam::new(LATENCY_CATEGORY, "ms", dist(&[(40.0, 1000.0)])),
        ];
        node.accept_response(downstream, Some(OUT));
        node.process_response(&mut env);

        let response = node.yield_response(Some(IN)).unwrap();
        let hop = response.iter().find(|r| r.category == HOP_CATEGORY).unwrap();
        assert_eq!(hop.value, dist(&[(3.0, 1000.0)]));
        let latency = response.iter().find(|r| r.category == LATENCY_CATEGORY).unwrap();
        assert_eq!(latency.value, dist(&[(40.0, 1000.0)]));
    }
}
