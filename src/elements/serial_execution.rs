//! serial_execution.rs
//! Forwards the load to every outport; the downstream responses happen one
//! after the other, so they add up.

use crate::config::graph::{GeneratesResponse, InportDef, OutportDef, Process, ProcessInterfaceDescription, ProcessPortTemplate};
use crate::elements::{ElementBehavior, PortSet};
use crate::error::Result;
use crate::graph::node::NodeIdentity;
use crate::response::add_response_groups;
use crate::simulation::environment::Environment;

pub const ID: &str = "serial-execution";
pub const IN: &str = "in";
pub const OUT_A: &str = "out-a";
pub const OUT_B: &str = "out-b";
pub const OUTS: &str = "outs";
pub const OUT: &str = "out";

pub fn description() -> ProcessInterfaceDescription {
    ProcessInterfaceDescription::new(ID, "Serial Execution")
        .inport(InportDef::new(IN, "In", GeneratesResponse::Always))
        .outport(OutportDef::new(OUT_A, "Out-A"))
        .outport(OutportDef::new(OUT_B, "Out-B"))
        .template(ProcessPortTemplate::new(OUTS, "Outs").outport(OutportDef::new(OUT, "Out")))
}

pub fn factory(_: &Process) -> Box<dyn ElementBehavior> {
    Box::new(SerialExecution)
}

pub struct SerialExecution;

fn targets(ports: &PortSet) -> Vec<usize> {
    let mut targets: Vec<usize> = [OUT_A, OUT_B].iter().filter_map(|r| ports.static_port(r)).collect();
    targets.extend(ports.instances(OUT));
    targets
}

impl ElementBehavior for SerialExecution {
    fn process(&mut self, ports: &mut PortSet, _node: &NodeIdentity, env: &mut Environment) -> Result<()> {
        let Some(load) = ports.load_of(IN).cloned() else {
            return Ok(());
        };
        for idx in targets(ports) {
            ports.emit(idx, load.clone(), env);
        }
        Ok(())
    }

    fn process_response(&mut self, ports: &mut PortSet, _node: &NodeIdentity, env: &mut Environment) -> Result<()> {
        // a silent outport still counts, as a zero-latency step
        let groups: Vec<_> = targets(ports)
            .into_iter()
            .map(|idx| ports.outport_response(idx, env).unwrap_or_default())
            .collect();
        let total = add_response_groups(&groups);
        if total.is_empty() {
            return Ok(());
        }
        if let Some(inport) = ports.static_port(IN) {
            ports.deliver_response(inport, total, env);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::testing::*;
    use crate::param::Param;
    use crate::response::types::dist;
    use crate::response::ResponseParam;

    fn latency(v: f64) -> Vec<ResponseParam> {
        vec![ResponseParam::new("latency", "ms", dist(&[(v, 1000.0)]))]
    }

    #[test]
    fn test_load_fans_out_and_responses_add() {
        let mut env = env();
        let mut node = build(&process(ID, Some((OUTS, OUT)), 1), &mut env);
        run(node.as_mut(), &mut env, &[(IN, Param::number(5.0))], None);
        for port in [OUT_A, OUT_B, "out-0"] {
            assert_eq!(node.yield_load(Some(port)), Some(&Param::number(5.0)));
        }

        node.accept_response(latency(10.0), Some(OUT_A));
        node.accept_response(latency(20.0), Some("out-0"));
        node.process_response(&mut env);
        let response = node.yield_response(Some(IN)).unwrap();
        assert_eq!(response[0].value, dist(&[(30.0, 1000.0)]));
    }

    #[test]
    fn test_no_responses_delivers_nothing() {
        let mut env = env();
        let mut node = build(&process(ID, None, 0), &mut env);
        run(node.as_mut(), &mut env, &[(IN, Param::number(5.0))], None);
        node.process_response(&mut env);
        assert!(node.yield_response(Some(IN)).is_none());
    }
}
