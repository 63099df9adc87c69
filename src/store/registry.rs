use super::types::*;
use crate::response::ResponseParam;
use std::collections::BTreeMap;

/// Every simulation node of a run, keyed by simulation id, with the facts
/// and warnings recorded against it.
#[derive(Debug, Clone, Default)]
pub struct NodeStore {
    nodes: BTreeMap<String, SimulationNode>,
}

impl NodeStore {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.nodes.len() }
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn get(&self, id: &str) -> Option<&SimulationNode> { self.nodes.get(id) }
    pub fn get_mut(&mut self, id: &str) -> Option<&mut SimulationNode> { self.nodes.get_mut(id) }
    pub fn contains(&self, id: &str) -> bool { self.nodes.contains_key(id) }
    pub fn ids(&self) -> Vec<String> { self.nodes.keys().cloned().collect() }
    pub fn iter(&self) -> impl Iterator<Item = &SimulationNode> { self.nodes.values() }

    /// Registers (or re-registers) a node record.
    pub fn register(&mut self, node: SimulationNode) {
        self.nodes.insert(node.object_id.clone(), node);
    }

    /// Facts for unregistered nodes are dropped.
    pub fn store_raw_data(&mut self, id: &str, cursor: &StepCursor, fact: NodeFact) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.raw_data.push(RawNodeDataEntry::at(cursor, fact));
        }
    }

    /// One raw entry per response category.
    pub fn store_raw_responses(&mut self, id: &str, cursor: &StepCursor, responses: &[ResponseParam]) {
        if let Some(node) = self.nodes.get_mut(id) {
            for r in responses {
                node.raw_responses.push(RawNodeDataEntry::at(cursor, r.clone()));
            }
        }
    }

    /// Attaches a warning to its node. Returns false when it was dropped as a
    /// duplicate or the node is unknown.
    pub fn warn(&mut self, message: RuntimeMessage) -> bool {
        let Some(node) = message.node_id.as_deref().and_then(|id| self.nodes.get_mut(id)) else {
            return false;
        };
        if !message.inhibit_dedup && node.warnings.iter().any(|w| w.duplicates(&message)) {
            return false;
        }
        node.warnings.push(message);
        true
    }

    /// All warnings of all nodes, in node order.
    pub fn warnings(&self) -> Vec<RuntimeMessage> {
        self.nodes.values().flat_map(|n| n.warnings.iter().cloned()).collect()
    }

    /// Folds another store into this one.
    ///
    /// Node records are taken from whichever store registered them first;
    /// raw facts are appended and warnings re-deduplicated.
    pub fn merge(&mut self, other: NodeStore) {
        for (id, node) in other.nodes {
            match self.nodes.get_mut(&id) {
                None => {
                    self.nodes.insert(id, node);
                }
                Some(existing) => {
                    existing.raw_data.extend(node.raw_data);
                    existing.raw_responses.extend(node.raw_responses);
                    for w in node.warnings {
                        if w.inhibit_dedup || !existing.warnings.iter().any(|e| e.duplicates(&w)) {
                            existing.warnings.push(w);
                        }
                    }
                }
            }
        }
    }

    pub fn into_nodes(self) -> BTreeMap<String, SimulationNode> { self.nodes }

    pub fn from_nodes(nodes: BTreeMap<String, SimulationNode>) -> Self { Self { nodes } }
}
