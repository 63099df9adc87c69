//! multiply.rs
//! Product of In-A, In-B and every multiplicand port.
//!
//! The custom-unit outport repeats the product with the unit given as a
//! STRING config on that outport (no config clears the unit).

use crate::config::graph::{GeneratesResponse, InportDef, OutportDef, Process, ProcessInterfaceDescription, ProcessPortTemplate};
use crate::elements::{ElementBehavior, PortSet};
use crate::error::{Result, SimError};
use crate::graph::node::NodeIdentity;
use crate::param::math_ops::{multiply, multiply_params};
use crate::param::Param;
use crate::simulation::environment::Environment;

pub const ID: &str = "multiply";
pub const IN_A: &str = "in-a";
pub const IN_B: &str = "in-b";
pub const OUT: &str = "out";
pub const OUT_CUSTOM_UNIT: &str = "out-custom-unit";
pub const MULTIPLICANDS: &str = "multiplicands";
pub const MULTIPLICAND: &str = "multiplicand";

pub fn description() -> ProcessInterfaceDescription {
    ProcessInterfaceDescription::new(ID, "Multiply")
        .inport(InportDef::new(IN_A, "In-A", GeneratesResponse::Passthrough))
        .inport(InportDef::new(IN_B, "In-B", GeneratesResponse::Passthrough))
        .outport(OutportDef::new(OUT, "Out"))
        .outport(OutportDef::new(OUT_CUSTOM_UNIT, "Out (custom unit)"))
        .template(ProcessPortTemplate::new(MULTIPLICANDS, "Multiplicands").inport(InportDef::new(
            MULTIPLICAND,
            "Multiplicand",
            GeneratesResponse::Passthrough,
        )))
}

pub fn factory(_: &Process) -> Box<dyn ElementBehavior> {
    Box::new(Multiply)
}

pub struct Multiply;

impl ElementBehavior for Multiply {
    fn process(&mut self, ports: &mut PortSet, _node: &NodeIdentity, env: &mut Environment) -> Result<()> {
        let missing = SimError::NotANumber { op: "multiply" };
        let a = ports.load_of(IN_A).ok_or(missing.clone())?;
        let b = ports.load_of(IN_B).ok_or(missing)?;
        let mut product = multiply_params(a, b)?;
        for idx in ports.instances(MULTIPLICAND) {
            if let Some(Param::Number(m)) = ports.load(idx) {
                product = multiply(&product, m);
            }
        }
        let custom_unit = match ports.config_of(OUT_CUSTOM_UNIT) {
            Some(Param::String { value }) => Some(value.clone()),
            _ => None,
        };

        if let Some(out) = ports.static_port(OUT) {
            ports.emit(out, Param::Number(product.clone()), env);
        }
        if let Some(out) = ports.static_port(OUT_CUSTOM_UNIT) {
            product.unit = custom_unit;
            ports.emit(out, Param::Number(product), env);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::testing::*;
    use crate::param::NumberParam;

    #[test]
    fn test_product_and_custom_unit() {
        let mut env = env();
        let mut process = process(ID, Some((MULTIPLICANDS, MULTIPLICAND)), 1);
        process.outports.get_mut(OUT_CUSTOM_UNIT).unwrap().config = Some(Param::String { value: "GB".into() });
        let mut node = build(&process, &mut env);
        run(
            node.as_mut(),
            &mut env,
            &[
                (IN_A, Param::Number(NumberParam::new(2.0).with_unit("req"))),
                (IN_B, Param::number(3.0)),
                ("multiplicand-0", Param::number(4.0)),
            ],
            None,
        );
        assert_eq!(node.yield_load(Some(OUT)), Some(&Param::Number(NumberParam::new(24.0).with_unit("req"))));
        assert_eq!(
            node.yield_load(Some(OUT_CUSTOM_UNIT)),
            Some(&Param::Number(NumberParam::new(24.0).with_unit("GB")))
        );
    }

    #[test]
    fn test_non_number_multiplicand_is_ignored() {
        let mut env = env();
        let mut node = build(&process(ID, Some((MULTIPLICANDS, MULTIPLICAND)), 1), &mut env);
        run(
            node.as_mut(),
            &mut env,
            &[(IN_A, Param::number(2.0)), (IN_B, Param::number(3.0)), ("multiplicand-0", Param::boolean(true))],
            None,
        );
        assert_eq!(node.yield_load(Some(OUT)), Some(&Param::number(6.0)));
        assert_eq!(node.yield_load(Some(OUT_CUSTOM_UNIT)), Some(&Param::number(6.0)));
    }
}
