//! Node identity: types, deterministic simulation ids and ancestor paths.

use crate::store::SimulationNode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    GraphModel,
    ProcessingElement,
    ProcessInport,
    ProcessOutport,
    NamedVariable,
    BroadcastVariable,
    /// Synthetic node for one aspect of an aggregated node.
    Breakdown,
    /// Synthetic node for one slice of an aspect.
    Slice,
}

/// Hashes `id` under its ancestor path.
///
/// The path is folded innermost-first (`p_n:...:p_0:id`) and the result
/// hex-encoded, so ids are stable across runs and machines.
pub fn gen_sim_id<S: AsRef<str>>(path: &[S], id: &str) -> String {
    let mut out = id.to_string();
    for n in path {
        out = format!("{}:{}", n.as_ref(), out);
    }
    format!("{:x}", Sha256::digest(out.as_bytes()))
}

/// Where a node sits in the instantiated graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub simulation_id: String,
    pub parent_id: Option<String>,
    /// Simulation ids of all ancestors, root first.
    pub path: Vec<String>,
    /// Id of the node inside its owning process.
    pub process_node_id: String,
    pub reference: String,
    pub release_nr: Option<u32>,
    pub label: String,
    pub node_type: NodeType,
}

impl NodeIdentity {
    pub fn new(
        parent: Option<&NodeIdentity>,
        process_node_id: impl Into<String>,
        node_type: NodeType,
        reference: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        let process_node_id = process_node_id.into();
        let path = parent.map(NodeIdentity::child_path).unwrap_or_default();
        Self {
            simulation_id: gen_sim_id(&path, &process_node_id),
            parent_id: parent.map(|p| p.simulation_id.clone()),
            path,
            process_node_id,
            reference: reference.into(),
            release_nr: None,
            label: label.into(),
            node_type,
        }
    }

    pub fn with_release(mut self, release_nr: Option<u32>) -> Self {
        self.release_nr = release_nr;
        self
    }

    /// The path children of this node are hashed under.
    pub fn child_path(&self) -> Vec<String> {
        let mut path = self.path.clone();
        path.push(self.simulation_id.clone());
        path
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// The record registered for this node.
    pub fn to_simulation_node(&self, children: Option<Vec<String>>) -> SimulationNode {
        let mut node = SimulationNode::new(self.simulation_id.clone(), self.node_type);
        node.parent_instance_id = self.parent_id.clone();
        node.sub_node_instance_ids = children;
        node.process_node_id = Some(self.process_node_id.clone());
        node.reference = Some(self.reference.clone());
        node.release_nr = self.release_nr;
        node.name = if self.label.is_empty() { None } else { Some(self.label.clone()) };
        node
    }
}
