//! dag.rs
//! Execution ordering of the nodes inside one graph model.

use crate::error::{Result, SimError};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use smallvec::SmallVec;

/// A node to schedule and the indices of the nodes it waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledNode {
    pub key: String,
    pub deps: SmallVec<[usize; 4]>,
}

impl ScheduledNode {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into(), deps: SmallVec::new() }
    }

    pub fn depends_on(&mut self, idx: usize) {
        if !self.deps.contains(&idx) {
            self.deps.push(idx);
        }
    }
}

// --- Graph Algorithms ---

/// Kahn's algorithm with a LIFO ready list.
///
/// Returns the execution order as indices into `nodes`, or the indices that
/// could never be scheduled.
pub fn kahn_order(nodes: &[ScheduledNode]) -> std::result::Result<Vec<usize>, Vec<usize>> {
    let mut remaining: Vec<SmallVec<[usize; 4]>> = nodes.iter().map(|n| n.deps.clone()).collect();
    let mut order = Vec::with_capacity(nodes.len());

    // 1. Seed with the nodes that wait for nothing
    let mut ready: Vec<usize> = (0..nodes.len()).filter(|&i| remaining[i].is_empty()).collect();

    // 2. Extract, then release everything waiting on the extracted node
    while let Some(node) = ready.pop() {
        order.push(node);
        for (i, deps) in remaining.iter_mut().enumerate() {
            if deps.contains(&node) {
                deps.retain(|d| *d != node);
                if deps.is_empty() {
                    ready.push(i);
                }
            }
        }
    }

    let stuck: Vec<usize> = (0..nodes.len()).filter(|&i| !remaining[i].is_empty()).collect();
    if !stuck.is_empty() || order.len() != nodes.len() {
        return Err(stuck);
    }
    Ok(order)
}

/// Names of the nodes on a dependency cycle among `stuck`.
pub fn cycle_members(nodes: &[ScheduledNode], stuck: &[usize]) -> Vec<String> {
    let mut graph = DiGraph::<usize, ()>::new();
    let handles: Vec<_> = stuck.iter().map(|&i| graph.add_node(i)).collect();
    for (pos, &i) in stuck.iter().enumerate() {
        for dep in &nodes[i].deps {
            if let Some(dep_pos) = stuck.iter().position(|s| s == dep) {
                graph.add_edge(handles[dep_pos], handles[pos], ());
            }
        }
    }
    let mut members: Vec<String> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .flatten()
        .map(|h| nodes[graph[h]].key.clone())
        .collect();
    members.sort();
    members
}

/// Execution order of a model's nodes; fails on cycles.
pub fn execution_order(model: &str, nodes: &[ScheduledNode]) -> Result<Vec<usize>> {
    kahn_order(nodes).map_err(|stuck| {
        let members = cycle_members(nodes, &stuck);
        if members.is_empty() {
            SimError::Topology {
                model: model.to_string(),
                stage: "calculate execution order",
                detail: format!(
                    "unresolved dependencies of {:?}",
                    stuck.iter().map(|&i| nodes[i].key.as_str()).collect::<Vec<_>>()
                ),
            }
        } else {
            SimError::CycleDetected { model: model.to_string(), nodes: members }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(edges: &[(usize, usize)], n: usize) -> Vec<ScheduledNode> {
        let names = ["A", "B", "C", "D", "E"];
        let mut nodes: Vec<ScheduledNode> = (0..n).map(|i| ScheduledNode::new(names[i])).collect();
        for &(from, to) in edges {
            nodes[to].depends_on(from);
        }
        nodes
    }

    #[test]
    fn test_linear_chain_orders_a_b_c() {
        let nodes = chain(&[(0, 1), (1, 2)], 3);
        let order = execution_order("m", &nodes).unwrap();
        let keys: Vec<&str> = order.iter().map(|&i| nodes[i].key.as_str()).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_back_edge_is_a_cycle() {
        let nodes = chain(&[(0, 1), (1, 2), (2, 0)], 3);
        match execution_order("m", &nodes) {
            Err(SimError::CycleDetected { model, nodes }) => {
                assert_eq!(model, "m");
                assert_eq!(nodes, vec!["A", "B", "C"]);
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let nodes = chain(&[(0, 1), (1, 1)], 2);
        match execution_order("m", &nodes) {
            Err(SimError::CycleDetected { nodes, .. }) => assert_eq!(nodes, vec!["B"]),
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_ready_list_is_lifo() {
        // A and B are both ready; the last seeded runs first
        let nodes = chain(&[(0, 2), (1, 2)], 3);
        assert_eq!(kahn_order(&nodes).unwrap(), vec![1, 0, 2]);
    }

    #[test]
    fn test_downstream_of_cycle_is_stuck_too() {
        let nodes = chain(&[(0, 1), (1, 0), (1, 2)], 3);
        let stuck = kahn_order(&nodes).unwrap_err();
        assert_eq!(stuck, vec![0, 1, 2]);
        assert_eq!(cycle_members(&nodes, &stuck), vec!["A", "B"]);
    }
}
