//! add_latency.rs
//! Passes the load through and adds its own latency to the response.
//!
//! The added latency is the Mean input, or a normal draw around it during
//! Monte Carlo trials when StdDev is positive. It is tagged with a
//! `__source__<simId>` response aspect so the contribution stays traceable.

use crate::config::graph::{GeneratesResponse, InportDef, OutportDef, Process, ProcessInterfaceDescription};
use crate::elements::{ElementBehavior, PortSet};
use crate::error::Result;
use crate::graph::node::NodeIdentity;
use crate::param::{Aspect, DistributionFamily, Param, RandomParam};
use crate::response::ops::make_latency_response;
use crate::response::types::{dist, SOURCE_ASPECT_PREFIX};
use crate::response::{add_response_groups, ResponseAspect, NORM_FREQ};
use crate::simulation::environment::Environment;
use std::collections::BTreeMap;

pub const ID: &str = "add-latency";
pub const IN: &str = "in";
pub const MEAN: &str = "mean";
pub const STDDEV: &str = "stddev";
pub const OUT: &str = "out";

pub fn description() -> ProcessInterfaceDescription {
    ProcessInterfaceDescription::new(ID, "Add Latency")
        .inport(InportDef::new(IN, "In", GeneratesResponse::Always))
        .inport(InportDef::new(MEAN, "Mean", GeneratesResponse::Never))
        .inport(InportDef::new(STDDEV, "StdDev", GeneratesResponse::Never))
        .outport(OutportDef::new(OUT, "Out"))
}

pub fn factory(_: &Process) -> Box<dyn ElementBehavior> {
    Box::new(AddLatency)
}

pub struct AddLatency;

fn number_of(ports: &PortSet, reference: &str) -> Option<f64> {
    ports.load_of(reference).and_then(Param::as_number).map(|n| n.value)
}

fn source_tag(node: &NodeIdentity, latency: f64) -> ResponseAspect {
    let mut slices = BTreeMap::new();
    slices.insert("added".to_string(), dist(&[(latency, NORM_FREQ)]));
    ResponseAspect { name: format!("{}{}", SOURCE_ASPECT_PREFIX, node.simulation_id), relative: false, slices }
}

impl ElementBehavior for AddLatency {
    fn process(&mut self, ports: &mut PortSet, _node: &NodeIdentity, env: &mut Environment) -> Result<()> {
        let load = ports.load_of(IN).cloned();
        if let (Some(load), Some(out)) = (load, ports.static_port(OUT)) {
            ports.emit(out, load, env);
        }
        Ok(())
    }

    fn process_response(&mut self, ports: &mut PortSet, node: &NodeIdentity, env: &mut Environment) -> Result<()> {
        let downstream = match ports.static_port(OUT) {
            Some(out) => ports.outport_response(out, env).filter(|r| !r.is_empty()),
            None => None,
        };
        let mean = number_of(ports, MEAN);
        if mean.is_none() && downstream.is_none() {
            return Ok(());
        }

        let mut latency = mean.unwrap_or(0.0);
        if let (Some(mean), Some(stddev)) = (mean, number_of(ports, STDDEV)) {
            if stddev > 0.0 && env.is_monte_carlo() {
                let normal = RandomParam::new(DistributionFamily::Normal, &[("mean", mean), ("stddev", stddev)]);
                latency = normal.sample(env.rng())?;
            }
        }

        let load_aspects: Vec<Aspect> = match ports.load_of(IN) {
            Some(Param::Number(n)) => n.aspects.clone(),
            _ => Vec::new(),
        };
        let mut added = make_latency_response(latency, &load_aspects);
        added.aspects.push(source_tag(node, latency));

        let response = match downstream {
            Some(downstream) => add_response_groups(&[vec![added], downstream]),
            None => vec![added],
        };
        if let Some(inport) = ports.static_port(IN) {
            ports.deliver_response(inport, response, env);
        }
        Ok(())
    }
}
