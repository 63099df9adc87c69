//! sum.rs
//! In-A + In-B + every summand port. The result carries the unit of In-A.

use crate::config::graph::{GeneratesResponse, InportDef, OutportDef, Process, ProcessInterfaceDescription, ProcessPortTemplate};
use crate::elements::{ElementBehavior, PortSet};
use crate::error::{Result, SimError};
use crate::graph::node::NodeIdentity;
use crate::param::math_ops::add_params;
use crate::param::Param;
use crate::simulation::environment::Environment;

pub const ID: &str = "sum";
pub const IN_A: &str = "in-a";
pub const IN_B: &str = "in-b";
pub const OUT: &str = "out";
pub const SUMMANDS: &str = "summands";
pub const SUMMAND: &str = "summand";

pub fn description() -> ProcessInterfaceDescription {
    ProcessInterfaceDescription::new(ID, "Sum")
        .inport(InportDef::new(IN_A, "In-A", GeneratesResponse::Passthrough))
        .inport(InportDef::new(IN_B, "In-B", GeneratesResponse::Passthrough))
        .outport(OutportDef::new(OUT, "Out"))
        .template(ProcessPortTemplate::new(SUMMANDS, "Summands").inport(InportDef::new(
            SUMMAND,
            "Summand",
            GeneratesResponse::Passthrough,
        )))
}

pub fn factory(_: &Process) -> Box<dyn ElementBehavior> {
    Box::new(Sum)
}

pub struct Sum;

impl ElementBehavior for Sum {
    fn process(&mut self, ports: &mut PortSet, _node: &NodeIdentity, env: &mut Environment) -> Result<()> {
        let missing = SimError::NotANumber { op: "add" };
        let a = ports.load_of(IN_A).ok_or(missing.clone())?;
        let b = ports.load_of(IN_B).ok_or(missing)?;
        let mut sum = add_params(a, b)?;
        // unconnected summands are skipped
        for idx in ports.instances(SUMMAND) {
            if let Some(summand) = ports.load(idx) {
                sum = add_params(&Param::Number(sum), summand)?;
            }
        }
        if let Some(unit) = a.as_number().and_then(|n| n.unit.clone()) {
            sum.unit = Some(unit);
        }
        if let Some(out) = ports.static_port(OUT) {
            ports.emit(out, Param::Number(sum), env);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::testing::*;
    use crate::param::NumberParam;

    fn num(v: f64, unit: Option<&str>) -> Param {
        let n = NumberParam::new(v);
        Param::Number(match unit {
            Some(u) => n.with_unit(u),
            None => n,
        })
    }

    #[test]
    fn test_sum_with_summands() {
        let mut env = env();
        let mut node = build(&process(ID, Some((SUMMANDS, SUMMAND)), 2), &mut env);
        run(
            node.as_mut(),
            &mut env,
            &[(IN_A, num(1.0, None)), (IN_B, num(2.0, None)), ("summand-0", num(3.0, None))],
            None,
        );
        assert_eq!(node.yield_load(Some(OUT)), Some(&num(6.0, None)));
    }

    #[test]
    fn test_unit_of_first_operand_wins() {
        let mut env = env();
        let mut node = build(&process(ID, None, 0), &mut env);
        run(node.as_mut(), &mut env, &[(IN_A, num(1.0, Some("tps"))), (IN_B, num(2.0, Some("rps")))], None);
        assert_eq!(node.yield_load(Some(OUT)), Some(&num(3.0, Some("tps"))));
    }

    #[test]
    fn test_missing_operand_skips_output() {
        let mut env = env();
        let mut node = build(&process(ID, None, 0), &mut env);
        run(node.as_mut(), &mut env, &[(IN_A, num(1.0, None))], None);
        assert!(node.yield_load(Some(OUT)).is_none());
    }
}
