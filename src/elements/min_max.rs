//! min_max.rs
//! Smallest or largest number over In-A, In-B and every value port.
//!
//! The weighted max also carries the aspects of every aspect-bearing
//! candidate, merged and scaled to the winning value.

use crate::config::graph::{GeneratesResponse, InportDef, OutportDef, Process, ProcessInterfaceDescription, ProcessPortTemplate};
use crate::elements::{ElementBehavior, PortSet};
use crate::error::Result;
use crate::graph::node::NodeIdentity;
use crate::param::load_ops::{add_aspects, scale_breakdowns};
use crate::param::math_ops::{max, min};
use crate::param::{Aspect, NumberParam, Param};
use crate::simulation::environment::Environment;

pub const MIN_ID: &str = "min";
pub const MAX_ID: &str = "max";
pub const MAX_WEIGHTED_ID: &str = "max-weighted";
pub const IN_A: &str = "in-a";
pub const IN_B: &str = "in-b";
pub const OUT: &str = "out";
pub const VALUES: &str = "values";
pub const VALUE: &str = "value";

fn describe(id: &str, name: &str) -> ProcessInterfaceDescription {
    ProcessInterfaceDescription::new(id, name)
        .inport(InportDef::new(IN_A, "In-A", GeneratesResponse::Passthrough))
        .inport(InportDef::new(IN_B, "In-B", GeneratesResponse::Passthrough))
        .outport(OutportDef::new(OUT, "Out"))
        .template(ProcessPortTemplate::new(VALUES, "Values").inport(InportDef::new(
            VALUE,
            "Value",
            GeneratesResponse::Passthrough,
        )))
}

pub fn min_description() -> ProcessInterfaceDescription {
    describe(MIN_ID, "Min")
}

pub fn max_description() -> ProcessInterfaceDescription {
    describe(MAX_ID, "Max")
}

pub fn max_weighted_description() -> ProcessInterfaceDescription {
    describe(MAX_WEIGHTED_ID, "Max (weighted)")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Min,
    Max,
    MaxWeighted,
}

pub fn min_factory(_: &Process) -> Box<dyn ElementBehavior> {
    Box::new(Extremum::Min)
}

pub fn max_factory(_: &Process) -> Box<dyn ElementBehavior> {
    Box::new(Extremum::Max)
}

pub fn max_weighted_factory(_: &Process) -> Box<dyn ElementBehavior> {
    Box::new(Extremum::MaxWeighted)
}

/// Loads of In-A, In-B and the value ports, in that order.
fn candidates(ports: &PortSet) -> Vec<&Param> {
    let mut loads: Vec<&Param> = [IN_A, IN_B].iter().filter_map(|r| ports.load_of(r)).collect();
    loads.extend(ports.instances(VALUE).into_iter().filter_map(|i| ports.load(i)));
    loads
}

/// Aspects of all aspect-bearing numbers folded together.
fn merged_aspects(loads: &[&NumberParam]) -> Vec<Aspect> {
    let mut value = 0.0;
    let mut aspects: Vec<Aspect> = Vec::new();
    for load in loads.iter().filter(|n| n.has_aspect()) {
        aspects = add_aspects(value, &aspects, load.value, &load.aspects);
        value += load.value;
    }
    aspects
}

impl ElementBehavior for Extremum {
    fn process(&mut self, ports: &mut PortSet, _node: &NodeIdentity, env: &mut Environment) -> Result<()> {
        let loads = candidates(ports);
        let numbers: Vec<&NumberParam> = loads.iter().filter_map(|p| p.as_number()).collect();
        let owned: Vec<NumberParam> = numbers.iter().map(|n| (*n).clone()).collect();
        let result = match self {
            Extremum::Min => min(&owned)?,
            Extremum::Max => max(&owned)?,
            Extremum::MaxWeighted => {
                let mut result = max(&owned)?;
                let aspects = merged_aspects(&numbers);
                if !aspects.is_empty() {
                    result.aspects = scale_breakdowns(result.value, &aspects);
                }
                result
            }
        };
        if let Some(out) = ports.static_port(OUT) {
            ports.emit(out, Param::Number(result), env);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::testing::*;
    use crate::elements::CALCULATION_FAILED;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(MIN_ID, 1.0)]
    #[case(MAX_ID, 7.0)]
    fn test_extremum_over_all_inputs(#[case] id: &str, #[case] expected: f64) {
        let mut env = env();
        let mut node = build(&process(id, Some((VALUES, VALUE)), 2), &mut env);
        run(
            node.as_mut(),
            &mut env,
            &[
                (IN_A, Param::number(3.0)),
                (IN_B, Param::String { value: "skip".into() }),
                ("value-0", Param::number(7.0)),
                ("value-1", Param::number(1.0)),
            ],
            None,
        );
        assert_eq!(node.yield_load(Some(OUT)), Some(&Param::number(expected)));
    }

    #[test]
    fn test_no_numbers_warns() {
        let mut env = env();
        let mut node = build(&process(MIN_ID, None, 0), &mut env);
        run(node.as_mut(), &mut env, &[], None);
        assert!(node.yield_load(Some(OUT)).is_none());
        assert_eq!(env.store().warnings()[0].code, CALCULATION_FAILED);
    }

    #[test]
    fn test_weighted_max_scales_merged_aspects() {
        let os_a = Aspect::new("os", [("ios".to_string(), 4.0), ("web".to_string(), 6.0)]);
        let os_b = Aspect::new("os", [("ios".to_string(), 10.0), ("web".to_string(), 10.0)]);
        let a = Param::Number(NumberParam::new(10.0).with_aspects(vec![os_a]));
        let b = Param::Number(NumberParam::new(20.0).with_aspects(vec![os_b]));

        let mut env = env();
        let mut node = build(&process(MAX_WEIGHTED_ID, None, 0), &mut env);
        run(node.as_mut(), &mut env, &[(IN_A, a), (IN_B, b)], None);

        let out = node.yield_load(Some(OUT)).and_then(Param::as_number).unwrap();
        assert_eq!(out.value, 20.0);
        let slices = &out.aspects[0].slices;
        // merged ios:14 web:16 of 30, scaled to 20
        assert_relative_eq!(slices["ios"], 14.0 * 20.0 / 30.0, epsilon = 1e-9);
        assert_relative_eq!(slices["web"], 16.0 * 20.0 / 30.0, epsilon = 1e-9);
    }
}
