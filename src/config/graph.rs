//! Serde definitions of graph models, processes and element interfaces.
//!
//! These are the documents a model editor produces. Maps are keyed by object
//! id and kept as `BTreeMap` so every traversal visits ids in the same order.

use crate::param::Param;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How an inport takes part in the backward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeneratesResponse {
    #[default]
    Always,
    Never,
    Passthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tracking {
    #[default]
    CurrentVersion,
    FixedVersion,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InportDef {
    pub object_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub required_types: Vec<String>,
    #[serde(default)]
    pub desired_units: Vec<String>,
    #[serde(default)]
    pub generates_response: GeneratesResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_param: Option<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutportDef {
    pub object_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// A port instance on a process, pointing at the interface port it realizes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPort {
    #[serde(default)]
    pub object_id: String,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_group_id: Option<String>,
    /// Element configuration carried by the port (units, switches).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Param>,
    /// Literal load used when nothing is connected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

impl ProcessPort {
    pub fn new(object_id: impl Into<String>, reference: impl Into<String>) -> Self {
        Self { object_id: object_id.into(), reference: reference.into(), ..Default::default() }
    }

    pub fn is_templated(&self) -> bool {
        self.template_id.is_some() || self.template_group_id.is_some()
    }

    /// Id the process uses for this port: its own object id, else the
    /// interface port it refers to.
    pub fn node_id(&self) -> &str {
        if self.object_id.is_empty() { &self.reference } else { &self.object_id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessType {
    ProcessingElement,
    GraphModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub object_id: String,
    #[serde(rename = "type")]
    pub process_type: ProcessType,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<Tracking>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_nr: Option<u32>,
    #[serde(default)]
    pub inports: BTreeMap<String, ProcessPort>,
    #[serde(default)]
    pub outports: BTreeMap<String, ProcessPort>,
}

impl Process {
    pub fn new(object_id: impl Into<String>, process_type: ProcessType, reference: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            process_type,
            reference: reference.into(),
            label: None,
            name: None,
            tracking: None,
            release_nr: None,
            inports: BTreeMap::new(),
            outports: BTreeMap::new(),
        }
    }

    /// Version of the referenced model this process pins.
    pub fn version(&self) -> String {
        reference_tracking_version(self.tracking, self.release_nr)
    }
}

/// `latest` for current-version tracking or a missing release, else `r<N>`.
pub fn reference_tracking_version(tracking: Option<Tracking>, release_nr: Option<u32>) -> String {
    match (tracking, release_nr) {
        (Some(Tracking::CurrentVersion), _) | (_, None) | (_, Some(0)) => "latest".to_string(),
        (_, Some(n)) => format!("r{}", n),
    }
}

/// A model or sheet someone depends on, at a resolved version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedDependency {
    pub id: String,
    pub version: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(default)]
    pub object_id: String,
    pub source: String,
    pub destination: String,
}

impl Connection {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        let (source, destination) = (source.into(), destination.into());
        Self { object_id: format!("{}->{}", source, destination), source, destination }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableKind {
    #[default]
    NamedVariable,
    BroadcastVariable,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDef {
    #[serde(default)]
    pub object_id: String,
    #[serde(rename = "objectType", default)]
    pub kind: VariableKind,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphModelDef {
    pub object_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub inports: BTreeMap<String, InportDef>,
    #[serde(default)]
    pub outports: BTreeMap<String, OutportDef>,
    #[serde(default)]
    pub processes: BTreeMap<String, Process>,
    #[serde(default)]
    pub connections: BTreeMap<String, Connection>,
    #[serde(default)]
    pub variables: BTreeMap<String, VariableDef>,
}

impl GraphModelDef {
    /// Nested models this model references, with their pinned versions.
    pub fn sub_model_ids(&self) -> Vec<VersionedDependency> {
        self.processes
            .values()
            .filter(|p| p.process_type == ProcessType::GraphModel)
            .map(|p| VersionedDependency {
                id: p.reference.clone(),
                version: p.version(),
                name: p.name.clone().or_else(|| p.label.clone()).unwrap_or_default(),
            })
            .collect()
    }
}

// --- Element interfaces ---

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPortTemplate {
    pub object_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub inport_templates: BTreeMap<String, InportDef>,
    #[serde(default)]
    pub outport_templates: BTreeMap<String, OutportDef>,
}

/// Static descriptor of a processing element: its ports and templates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInterfaceDescription {
    pub object_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub inports: BTreeMap<String, InportDef>,
    #[serde(default)]
    pub outports: BTreeMap<String, OutportDef>,
    #[serde(default)]
    pub port_templates: BTreeMap<String, ProcessPortTemplate>,
}

impl InportDef {
    pub fn new(object_id: impl Into<String>, name: impl Into<String>, generates_response: GeneratesResponse) -> Self {
        Self { object_id: object_id.into(), name: name.into(), generates_response, ..Default::default() }
    }
}

impl OutportDef {
    pub fn new(object_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { object_id: object_id.into(), name: name.into(), ..Default::default() }
    }
}

impl ProcessPortTemplate {
    pub fn new(object_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { object_id: object_id.into(), name: name.into(), ..Default::default() }
    }

    pub fn inport(mut self, def: InportDef) -> Self {
        self.inport_templates.insert(def.object_id.clone(), def);
        self
    }

    pub fn outport(mut self, def: OutportDef) -> Self {
        self.outport_templates.insert(def.object_id.clone(), def);
        self
    }
}

impl ProcessInterfaceDescription {
    pub fn new(object_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { object_id: object_id.into(), name: name.into(), ..Default::default() }
    }

    pub fn inport(mut self, def: InportDef) -> Self {
        self.inports.insert(def.object_id.clone(), def);
        self
    }

    pub fn outport(mut self, def: OutportDef) -> Self {
        self.outports.insert(def.object_id.clone(), def);
        self
    }

    pub fn template(mut self, template: ProcessPortTemplate) -> Self {
        self.port_templates.insert(template.object_id.clone(), template);
        self
    }
}
