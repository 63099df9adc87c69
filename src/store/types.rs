use crate::aggregation::report::{AggregatedReport, AggregationMethod};
use crate::error::SimulationStage;
use crate::graph::node::NodeType;
use crate::param::Param;
use crate::response::ResponseParam;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Error,
    Warning,
    Info,
}

/// A message a node emits as data (e.g. a triggered warning element).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub blank: bool,
}

/// Anything a node records on the forward pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeFact {
    Param(Param),
    Message(SimulationMessage),
}

impl From<Param> for NodeFact {
    fn from(p: Param) -> Self {
        NodeFact::Param(p)
    }
}

impl From<SimulationMessage> for NodeFact {
    fn from(m: SimulationMessage) -> Self {
        NodeFact::Message(m)
    }
}

/// Where in the run a fact was produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepCursor {
    pub scenario_id: String,
    pub step_date: String,
    /// `None` for the mean pass.
    pub mc_run: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNodeDataEntry<T> {
    pub scenario_id: String,
    pub step_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mc_run: Option<u32>,
    pub data: T,
}

impl<T> RawNodeDataEntry<T> {
    pub fn at(cursor: &StepCursor, data: T) -> Self {
        Self {
            scenario_id: cursor.scenario_id.clone(),
            step_date: cursor.step_date.clone(),
            mc_run: cursor.mc_run,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub node_id: String,
    pub name: String,
}

/// A warning or failure with the execution context it happened in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeMessage {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub stage: SimulationStage,
    #[serde(default)]
    pub stack: Vec<StackFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip)]
    pub inhibit_dedup: bool,
}

impl RuntimeMessage {
    /// Same node, code and description.
    pub fn duplicates(&self, other: &RuntimeMessage) -> bool {
        self.node_id == other.node_id && self.code == other.code && self.desc == other.desc
    }
}

pub type ScenarioReports = BTreeMap<String, BTreeMap<String, AggregatedReport>>;

/// One structurally distinct position of the instantiated graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationNode {
    pub object_id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_node_instance_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_node_id: Option<String>,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_nr: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<RuntimeMessage>,
    #[serde(default)]
    pub aggregation_methods: Vec<AggregationMethod>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aggregated_report: ScenarioReports,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_data: Vec<RawNodeDataEntry<NodeFact>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_responses: Vec<RawNodeDataEntry<ResponseParam>>,
}

impl SimulationNode {
    pub fn new(object_id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            object_id: object_id.into(),
            node_type,
            parent_instance_id: None,
            sub_node_instance_ids: None,
            process_node_id: None,
            reference: None,
            release_nr: None,
            name: None,
            warnings: Vec::new(),
            aggregation_methods: Vec::new(),
            aggregated_report: BTreeMap::new(),
            raw_data: Vec::new(),
            raw_responses: Vec::new(),
        }
    }

    /// Adds `child` to the sub-node list unless it is already there.
    pub fn add_child(&mut self, child: &str) {
        let children = self.sub_node_instance_ids.get_or_insert_with(Vec::new);
        if !children.iter().any(|c| c == child) {
            children.push(child.to_string());
        }
    }

    pub fn name_or_id(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.object_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_untagged_round_trip() {
        let warning: NodeFact = serde_json::from_str(r#"{"type":"WARNING","name":"overload"}"#).unwrap();
        assert_eq!(
            warning,
            NodeFact::Message(SimulationMessage {
                message_type: MessageType::Warning,
                name: "overload".into(),
                blank: false
            })
        );
        let number: NodeFact = serde_json::from_str(r#"{"type":"NUMBER","value":3}"#).unwrap();
        assert_eq!(number, NodeFact::Param(Param::number(3.0)));
    }

    #[test]
    fn test_add_child_is_idempotent() {
        let mut n = SimulationNode::new("a", NodeType::GraphModel);
        n.add_child("b");
        n.add_child("b");
        assert_eq!(n.sub_node_instance_ids, Some(vec!["b".to_string()]));
    }

    #[test]
    fn test_runtime_message_skips_dedup_flag() {
        let m = RuntimeMessage {
            code: "X".into(),
            node_id: Some("n".into()),
            stage: SimulationStage::Simulation,
            stack: vec![],
            date: None,
            scenario_id: None,
            desc: None,
            inhibit_dedup: true,
        };
        let json = serde_json::to_string(&m).unwrap();
        assert!(!json.contains("inhibit"));
        assert_eq!(json, r#"{"code":"X","nodeId":"n","stage":"SIMULATION","stack":[]}"#);
    }
}
