//! ports.rs
//! The port machinery shared by all processing elements.
//!
//! Static ports realize interface ports one to one and are found by the
//! interface port id (internal) or the process port id (external). Dynamic
//! ports are instantiated from port templates, grouped by template group,
//! and are only addressable externally.

use crate::config::graph::{GeneratesResponse, Process, ProcessInterfaceDescription, ProcessPort};
use crate::error::{Result, SimError};
use crate::graph::lifecycle::{ActiveNode, Lifecycle};
use crate::graph::node::NodeIdentity;
use crate::graph::port::Port;
use crate::param::Param;
use crate::response::{add_response_groups, ResponseParam};
use crate::simulation::environment::Environment;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct PortSet {
    ports: Vec<Port>,
    internal: BTreeMap<String, usize>,
    external: BTreeMap<String, usize>,
}

struct DynamicMember<'a> {
    key: &'a str,
    port: &'a ProcessPort,
    inbound: bool,
}

impl PortSet {
    /// Instantiates the ports `process` declares against `desc`, plus the
    /// interface ports the process leaves out.
    pub fn build(process: &Process, desc: &ProcessInterfaceDescription, owner: &NodeIdentity) -> Result<Self> {
        let fail = |detail: String| SimError::Topology { model: owner.label.clone(), stage: "create ports", detail };
        let mut set = PortSet::default();

        // 1. Static ports
        for (key, pp) in process.inports.iter().filter(|(_, pp)| !pp.is_templated()) {
            let def = desc
                .inports
                .get(&pp.reference)
                .ok_or_else(|| fail(format!("'{}' has no inport '{}'", desc.name, pp.reference)))?;
            set.add(Port::inport(def.clone(), pp.clone(), key, Some(owner)), Some(pp.reference.as_str()), key);
        }
        for (key, pp) in process.outports.iter().filter(|(_, pp)| !pp.is_templated()) {
            let def = desc
                .outports
                .get(&pp.reference)
                .ok_or_else(|| fail(format!("'{}' has no outport '{}'", desc.name, pp.reference)))?;
            set.add(Port::outport(def.clone(), pp.clone(), key, Some(owner)), Some(pp.reference.as_str()), key);
        }
        for (id, def) in &desc.inports {
            if !set.internal.contains_key(id) && !set.external.contains_key(id) {
                set.add(Port::inport(def.clone(), ProcessPort::new(id.clone(), id.clone()), id, Some(owner)), Some(id.as_str()), id);
            }
        }
        for (id, def) in &desc.outports {
            if !set.internal.contains_key(id) && !set.external.contains_key(id) {
                set.add(Port::outport(def.clone(), ProcessPort::new(id.clone(), id.clone()), id, Some(owner)), Some(id.as_str()), id);
            }
        }

        // 2. Dynamic ports, one group per template instance
        let mut groups: BTreeMap<&str, Vec<DynamicMember>> = BTreeMap::new();
        let inbound = process.inports.iter().map(|(k, pp)| (k, pp, true));
        let outbound = process.outports.iter().map(|(k, pp)| (k, pp, false));
        for (key, pp, is_in) in inbound.chain(outbound).filter(|(_, pp, _)| pp.is_templated()) {
            let group = pp.template_group_id.as_deref().or(pp.template_id.as_deref()).unwrap_or_default();
            groups.entry(group).or_default().push(DynamicMember { key, port: pp, inbound: is_in });
        }
        for (group, members) in groups {
            let template_id = members
                .first()
                .and_then(|m| m.port.template_id.as_deref())
                .ok_or_else(|| fail(format!("template group '{}' names no template", group)))?;
            let template = desc
                .port_templates
                .get(template_id)
                .ok_or_else(|| fail(format!("'{}' has no port template '{}'", desc.name, template_id)))?;
            for m in members {
                let port = if m.inbound {
                    let def = template
                        .inport_templates
                        .get(&m.port.reference)
                        .ok_or_else(|| fail(format!("template '{}' has no inport '{}'", template_id, m.port.reference)))?;
                    Port::inport(def.clone(), m.port.clone(), m.key, Some(owner))
                } else {
                    let def = template
                        .outport_templates
                        .get(&m.port.reference)
                        .ok_or_else(|| fail(format!("template '{}' has no outport '{}'", template_id, m.port.reference)))?;
                    Port::outport(def.clone(), m.port.clone(), m.key, Some(owner))
                };
                set.add(port, None, m.key);
            }
        }
        Ok(set)
    }

    fn add(&mut self, port: Port, internal: Option<&str>, external: &str) {
        let idx = self.ports.len();
        if let Some(id) = internal {
            self.internal.insert(id.to_string(), idx);
        }
        self.external.insert(external.to_string(), idx);
        self.ports.push(port);
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn init(&mut self, env: &mut Environment) -> bool {
        self.ports.iter_mut().all(|p| p.init(env))
    }

    pub fn child_ids(&self) -> Vec<String> {
        self.ports.iter().map(|p| p.identity().simulation_id.clone()).collect()
    }

    pub fn reset(&mut self) {
        for p in &mut self.ports {
            p.reset();
        }
    }

    pub fn post_process(&mut self, env: &mut Environment) {
        for p in &mut self.ports {
            p.post_process(env);
        }
    }

    // --- Lookup ---

    pub fn find_external_first(&self, id: Option<&str>) -> Option<usize> {
        let id = id?;
        self.external.get(id).or_else(|| self.internal.get(id)).copied()
    }

    pub fn find_internal_first(&self, id: Option<&str>) -> Option<usize> {
        let id = id?;
        self.internal.get(id).or_else(|| self.external.get(id)).copied()
    }

    /// The static port realizing interface port `reference`.
    pub fn static_port(&self, reference: &str) -> Option<usize> {
        self.internal.get(reference).copied()
    }

    /// Dynamic ports instantiated from template port `template_port`.
    pub fn instances(&self, template_port: &str) -> Vec<usize> {
        let mut found: Vec<usize> = self
            .external
            .values()
            .copied()
            .filter(|&i| self.ports[i].process_port.is_templated() && self.ports[i].reference() == template_port)
            .collect();
        found.sort_unstable();
        found
    }

    pub fn port(&self, idx: usize) -> &Port {
        &self.ports[idx]
    }

    pub fn port_mut(&mut self, idx: usize) -> &mut Port {
        &mut self.ports[idx]
    }

    pub fn inports(&self) -> Vec<usize> {
        (0..self.ports.len()).filter(|&i| self.ports[i].is_inport()).collect()
    }

    pub fn outports(&self) -> Vec<usize> {
        (0..self.ports.len()).filter(|&i| !self.ports[i].is_inport()).collect()
    }

    pub fn load(&self, idx: usize) -> Option<&Param> {
        self.ports[idx].yield_load(None)
    }

    /// Load of the static port realizing `reference`.
    pub fn load_of(&self, reference: &str) -> Option<&Param> {
        self.static_port(reference).and_then(|i| self.load(i))
    }

    /// Configuration the process attached to static port `reference`.
    pub fn config_of(&self, reference: &str) -> Option<&Param> {
        self.static_port(reference).and_then(|i| self.ports[i].process_port.config.as_ref())
    }

    // --- Propagation ---

    pub fn process_inports(&mut self, env: &mut Environment) {
        for p in self.ports.iter_mut().filter(|p| p.is_inport()) {
            p.process(env);
        }
    }

    /// Hands `load` to port `idx` and processes it.
    pub fn emit(&mut self, idx: usize, load: Param, env: &mut Environment) {
        let port = &mut self.ports[idx];
        port.accept_load(load, None);
        port.process(env);
    }

    /// Processes the response of port `idx` and returns it.
    pub fn outport_response(&mut self, idx: usize, env: &mut Environment) -> Option<Vec<ResponseParam>> {
        let port = &mut self.ports[idx];
        port.process_response(env);
        port.yield_response(None).cloned()
    }

    pub fn deliver_response(&mut self, idx: usize, response: Vec<ResponseParam>, env: &mut Environment) {
        let port = &mut self.ports[idx];
        port.accept_response(response, None);
        port.process_response(env);
    }

    /// Adds up the responses of every outport and hands the total to every
    /// inport that takes part in the backward pass.
    pub fn default_response(&mut self, env: &mut Environment) {
        let groups: Vec<Vec<ResponseParam>> =
            self.outports().into_iter().filter_map(|i| self.outport_response(i, env)).collect();
        if groups.is_empty() {
            return;
        }
        let total = add_response_groups(&groups);
        if total.is_empty() {
            return;
        }
        for i in self.inports() {
            if self.ports[i].generates_response() != GeneratesResponse::Never {
                self.deliver_response(i, total.clone(), env);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::graph::{InportDef, OutportDef, ProcessPortTemplate, ProcessType};
    use crate::graph::node::NodeType;

    fn desc() -> ProcessInterfaceDescription {
        ProcessInterfaceDescription::new("pe", "Element")
            .inport(InportDef::new("in", "In", GeneratesResponse::Always))
            .inport(InportDef::new("cfg", "Cfg", GeneratesResponse::Never))
            .outport(OutportDef::new("out", "Out"))
            .template(ProcessPortTemplate::new("extra", "Extra").inport(InportDef::new("extra-in", "Extra", GeneratesResponse::Always)))
    }

    fn owner() -> NodeIdentity {
        NodeIdentity::new(None, "p1", NodeType::ProcessingElement, "pe", "Element")
    }

    fn templated(key: &str, group: &str) -> ProcessPort {
        ProcessPort {
            template_id: Some("extra".into()),
            template_group_id: Some(group.into()),
            ..ProcessPort::new(key, "extra-in")
        }
    }

    #[test]
    fn test_static_and_dynamic_ports() {
        let mut process = Process::new("p1", ProcessType::ProcessingElement, "pe");
        process.inports.insert("pin".into(), ProcessPort::new("pin", "in"));
        process.inports.insert("x1".into(), templated("x1", "g1"));
        process.inports.insert("x2".into(), templated("x2", "g2"));

        let set = PortSet::build(&process, &desc(), &owner()).unwrap();
        // in, cfg, out, two dynamic inports
        assert_eq!(set.len(), 5);
        let pin = set.find_external_first(Some("pin")).unwrap();
        assert_eq!(set.find_internal_first(Some("in")), Some(pin));
        assert_eq!(set.static_port("in"), Some(pin));
        assert_eq!(set.instances("extra-in").len(), 2);
        assert!(set.static_port("extra-in").is_none());
        assert_eq!(set.port(pin).identity().process_node_id, "pin");
    }

    #[test]
    fn test_unknown_interface_port_fails() {
        let mut process = Process::new("p1", ProcessType::ProcessingElement, "pe");
        process.inports.insert("bad".into(), ProcessPort::new("bad", "nope"));
        let err = PortSet::build(&process, &desc(), &owner()).unwrap_err();
        assert!(matches!(err, SimError::Topology { stage: "create ports", .. }));
    }

    #[test]
    fn test_unknown_template_fails() {
        let mut process = Process::new("p1", ProcessType::ProcessingElement, "pe");
        let mut pp = templated("x1", "g1");
        pp.template_id = Some("missing".into());
        process.inports.insert("x1".into(), pp);
        assert!(PortSet::build(&process, &desc(), &owner()).is_err());
    }
}
