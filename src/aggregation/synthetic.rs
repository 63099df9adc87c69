//! synthetic.rs
//! Extra nodes derived from aggregated ones so breakdowns and response
//! categories can be browsed like any other node:
//!
//! ```text
//! node ── (category) node
//!      └─ aspect ── slice
//!                └─ slice
//! ```

use crate::aggregation::report::{number_statistics, Aggregate, AggregatedReport, AggregationMethod, StepAggregate};
use crate::graph::node::{gen_sim_id, NodeType};
use crate::param::load_ops::scale_breakdown;
use crate::param::{Aspect, NumberParam};
use crate::response::ops::{flatten_response_aspect_value, response_value_histogram_aggregation};
use crate::response::types::SOURCE_ASPECT_PREFIX;
use crate::response::{ResponseAspect, ResponseParam};
use crate::store::{RawNodeDataEntry, SimulationNode};
use std::collections::BTreeMap;

// --- Response categories ---

/// Moves the raw responses of a node that mixes categories into one child
/// per category. The parent keeps no raw responses afterwards.
pub fn split_response_categories(parent: &mut SimulationNode) -> Vec<SimulationNode> {
    let mut groups: Vec<(String, Vec<RawNodeDataEntry<ResponseParam>>)> = Vec::new();
    for entry in parent.raw_responses.drain(..) {
        match groups.iter_mut().find(|(c, _)| *c == entry.data.category) {
            Some((_, entries)) => entries.push(entry),
            None => groups.push((entry.data.category.clone(), vec![entry])),
        }
    }
    if groups.len() < 2 {
        parent.raw_responses = groups.pop().map(|(_, entries)| entries).unwrap_or_default();
        return Vec::new();
    }

    groups
        .into_iter()
        .map(|(category, entries)| {
            let id = gen_sim_id(&[category.as_str()], &parent.object_id);
            let mut child = SimulationNode::new(id, parent.node_type);
            child.parent_instance_id = Some(parent.object_id.clone());
            child.name = Some(format!("{} ({})", parent.name_or_id(), category));
            child.raw_responses = entries;
            parent.add_child(&child.object_id);
            child
        })
        .collect()
}

// --- Breakdowns ---

/// Breakdown and slice nodes collected over all aggregated nodes.
#[derive(Debug, Default)]
pub struct BreakdownNodes {
    nodes: BTreeMap<String, SimulationNode>,
}

impl BreakdownNodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_nodes(self) -> BTreeMap<String, SimulationNode> {
        self.nodes
    }

    fn node(&mut self, id: &str, parent_id: &str, node_type: NodeType, name: &str) -> &mut SimulationNode {
        self.nodes.entry(id.to_string()).or_insert_with(|| {
            let mut node = SimulationNode::new(id, node_type);
            node.parent_instance_id = Some(parent_id.to_string());
            node.name = Some(name.to_string());
            node
        })
    }

    fn aspect_node(&mut self, parent: &mut SimulationNode, aspect: &str) -> String {
        let id = gen_sim_id(&[aspect], &parent.object_id);
        parent.add_child(&id);
        self.node(&id, &parent.object_id, NodeType::Breakdown, aspect);
        id
    }

    fn slice_node(&mut self, aspect_id: &str, aspect: &str, slice: &str) -> String {
        let id = gen_sim_id(&[aspect, slice], aspect_id);
        if let Some(aspect_node) = self.nodes.get_mut(aspect_id) {
            aspect_node.add_child(&id);
        }
        self.node(&id, aspect_id, NodeType::Slice, slice);
        id
    }

    /// Writes `aggregates` into the data or response side of one step of node `id`.
    fn record(&mut self, id: &str, scenario: &str, date: &str, response: bool, aggregates: StepAggregate) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        for method in aggregates.keys() {
            if !node.aggregation_methods.contains(method) {
                node.aggregation_methods.push(*method);
            }
        }
        let report = node
            .aggregated_report
            .entry(scenario.to_string())
            .or_default()
            .entry(date.to_string())
            .or_default();
        let side = if response { &mut report.response } else { &mut report.data };
        side.extend(aggregates);
    }

    /// Adds the breakdown and slice nodes of every aggregated step of `parent`.
    pub fn collect(&mut self, parent: &mut SimulationNode) {
        let has = |m: AggregationMethod| parent.aggregation_methods.contains(&m);
        let data_aspects = has(AggregationMethod::Aspects) && has(AggregationMethod::Avg);
        let response_aspects = has(AggregationMethod::ResponseAspects) && has(AggregationMethod::Avg);
        if !data_aspects && !response_aspects {
            return;
        }

        let steps: Vec<(String, String, AggregatedReport)> = parent
            .aggregated_report
            .iter()
            .flat_map(|(scenario, dates)| {
                dates.iter().map(move |(date, report)| (scenario.clone(), date.clone(), report.clone()))
            })
            .collect();
        for (scenario, date, report) in steps {
            if data_aspects {
                self.data_breakdowns(parent, &scenario, &date, &report.data);
            }
            if response_aspects {
                self.response_breakdowns(parent, &scenario, &date, &report.response);
            }
        }
    }

    fn data_breakdowns(&mut self, parent: &mut SimulationNode, scenario: &str, date: &str, data: &StepAggregate) {
        let (Some(Aggregate::Aspects { values }), Some(Aggregate::Number(avg))) =
            (data.get(&AggregationMethod::Aspects), data.get(&AggregationMethod::Avg))
        else {
            return;
        };
        for aspect in values {
            let scaled = scale_breakdown(avg.value, aspect);
            let aspect_id = self.aspect_node(parent, &aspect.name);
            let mut step = StepAggregate::new();
            step.insert(
                AggregationMethod::Avg,
                Aggregate::Number(NumberParam {
                    value: avg.value,
                    unit: avg.unit.clone(),
                    aspects: vec![scaled.clone()],
                }),
            );
            self.record(&aspect_id, scenario, date, false, step);

            for (slice, value) in &scaled.slices {
                let slice_id = self.slice_node(&aspect_id, &aspect.name, slice);
                let mut step = StepAggregate::new();
                step.insert(
                    AggregationMethod::Avg,
                    Aggregate::Number(NumberParam { value: *value, unit: avg.unit.clone(), aspects: Vec::new() }),
                );
                self.record(&slice_id, scenario, date, false, step);
            }
        }
    }

    fn response_breakdowns(&mut self, parent: &mut SimulationNode, scenario: &str, date: &str, response: &StepAggregate) {
        let (Some(Aggregate::ResponseAspects { values }), true) = (
            response.get(&AggregationMethod::ResponseAspects),
            response.contains_key(&AggregationMethod::Avg),
        ) else {
            return;
        };
        for aspect in values.iter().filter(|a| !a.name.starts_with(SOURCE_ASPECT_PREFIX)) {
            let aspect_id = self.aspect_node(parent, &aspect.name);
            self.record(&aspect_id, scenario, date, true, flattened_step(response, aspect));

            for (slice, value) in &aspect.slices {
                let slice_id = self.slice_node(&aspect_id, &aspect.name, slice);
                let mut step = StepAggregate::new();
                number_statistics(&response_value_histogram_aggregation(value), None, &mut step);
                self.record(&slice_id, scenario, date, true, step);
            }
        }
    }
}

/// The parent's numeric and histogram aggregates, each number tagged with
/// the aspect reduced to slice means.
fn flattened_step(response: &StepAggregate, aspect: &ResponseAspect) -> StepAggregate {
    let flattened: Aspect = flatten_response_aspect_value(aspect);
    response
        .iter()
        .filter_map(|(method, aggregate)| match aggregate {
            Aggregate::Number(n) => Some((
                *method,
                Aggregate::Number(NumberParam { value: n.value, unit: n.unit.clone(), aspects: vec![flattened.clone()] }),
            )),
            Aggregate::Histogram { .. } => Some((*method, aggregate.clone())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::types::dist;
    use crate::store::StepCursor;
    use approx::assert_relative_eq;

    fn cursor() -> StepCursor {
        StepCursor { scenario_id: "s".into(), step_date: "2024-01".into(), mc_run: None }
    }

    fn node_with_report(data: StepAggregate, response: StepAggregate) -> SimulationNode {
        let mut node = SimulationNode::new("parent", NodeType::ProcessOutport);
        node.name = Some("Out".into());
        let report = AggregatedReport { data, response };
        node.aggregation_methods = report.methods().collect();
        node.aggregated_report
            .entry("s".into())
            .or_default()
            .insert("2024-01".into(), report);
        node
    }

    #[test]
    fn test_single_category_stays_on_parent() {
        let mut node = SimulationNode::new("p", NodeType::ProcessInport);
        for _ in 0..2 {
            node.raw_responses.push(RawNodeDataEntry::at(
                &cursor(),
                ResponseParam::new("latency", "ms", dist(&[(1.0, 1000.0)])),
            ));
        }
        assert!(split_response_categories(&mut node).is_empty());
        assert_eq!(node.raw_responses.len(), 2);
        assert!(node.sub_node_instance_ids.is_none());
    }

    #[test]
    fn test_mixed_categories_split_into_children() {
        let mut node = SimulationNode::new("p", NodeType::ProcessInport);
        node.name = Some("In".into());
        for category in ["latency", "hop", "latency"] {
            node.raw_responses.push(RawNodeDataEntry::at(
                &cursor(),
                ResponseParam::new(category, "", dist(&[(1.0, 1000.0)])),
            ));
        }
        let children = split_response_categories(&mut node);
        assert!(node.raw_responses.is_empty());
        let names: Vec<_> = children.iter().map(|c| c.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["In (latency)", "In (hop)"]);
        assert_eq!(children[0].raw_responses.len(), 2);
        assert_eq!(children[0].object_id, gen_sim_id(&["latency"], "p"));
        assert_eq!(children[1].node_type, NodeType::ProcessInport);
        assert_eq!(node.sub_node_instance_ids.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_data_aspects_become_breakdown_and_slices() {
        let mut data = StepAggregate::new();
        data.insert(AggregationMethod::Avg, Aggregate::Number(NumberParam::new(10.0).with_unit("rps")));
        data.insert(
            AggregationMethod::Aspects,
            Aggregate::Aspects {
                values: vec![Aspect::new("region", [("eu".to_string(), 3.0), ("us".to_string(), 1.0)])],
            },
        );
        let mut parent = node_with_report(data, StepAggregate::new());
        let mut extra = BreakdownNodes::new();
        extra.collect(&mut parent);
        let nodes = extra.into_nodes();

        let aspect_id = gen_sim_id(&["region"], "parent");
        let eu_id = gen_sim_id(&["region", "eu"], &aspect_id);
        assert_eq!(nodes.len(), 3);
        assert_eq!(parent.sub_node_instance_ids, Some(vec![aspect_id.clone()]));
        let aspect = &nodes[&aspect_id];
        assert_eq!(aspect.node_type, NodeType::Breakdown);
        assert_eq!(aspect.sub_node_instance_ids.as_ref().map(Vec::len), Some(2));

        let eu = &nodes[&eu_id];
        assert_eq!(eu.node_type, NodeType::Slice);
        assert_eq!(eu.aggregation_methods, vec![AggregationMethod::Avg]);
        let avg = eu.aggregated_report["s"]["2024-01"].data[&AggregationMethod::Avg].as_number().unwrap();
        assert_relative_eq!(avg.value, 7.5);
        assert_eq!(avg.unit.as_deref(), Some("rps"));
    }

    #[test]
    fn test_response_aspects_skip_source_tags() {
        let mut slices = BTreeMap::new();
        slices.insert("db".to_string(), dist(&[(10.0, 500.0), (20.0, 500.0)]));
        let tier = ResponseAspect { name: "tier".into(), relative: false, slices: slices.clone() };
        let source = ResponseAspect { name: format!("{}abc", SOURCE_ASPECT_PREFIX), relative: false, slices };

        let mut response = StepAggregate::new();
        number_statistics(&[10.0, 20.0], Some("ms"), &mut response);
        response.insert(AggregationMethod::ResponseAspects, Aggregate::ResponseAspects { values: vec![tier, source] });
        let mut parent = node_with_report(StepAggregate::new(), response);
        let mut extra = BreakdownNodes::new();
        extra.collect(&mut parent);
        let nodes = extra.into_nodes();
        assert_eq!(nodes.len(), 2);

        let aspect = &nodes[&gen_sim_id(&["tier"], "parent")];
        let step = &aspect.aggregated_report["s"]["2024-01"].response;
        assert!(step.contains_key(&AggregationMethod::Histogram));
        assert!(!step.contains_key(&AggregationMethod::ResponseAspects));
        let avg = step[&AggregationMethod::Avg].as_number().unwrap();
        assert_relative_eq!(avg.value, 15.0);
        assert_relative_eq!(avg.aspects[0].slices["db"], 15.0);

        let slice_id = gen_sim_id(&["tier", "db"], &aspect.object_id);
        let slice = &nodes[&slice_id].aggregated_report["s"]["2024-01"].response;
        assert_relative_eq!(slice[&AggregationMethod::Avg].as_number().unwrap().value, 15.0);
        assert_eq!(slice[&AggregationMethod::Min].as_number().unwrap().value, 10.0);
    }

    #[test]
    fn test_no_aspects_no_nodes() {
        let mut data = StepAggregate::new();
        data.insert(AggregationMethod::Avg, Aggregate::Number(NumberParam::new(1.0)));
        let mut parent = node_with_report(data, StepAggregate::new());
        let mut extra = BreakdownNodes::new();
        extra.collect(&mut parent);
        assert!(extra.into_nodes().is_empty());
        assert!(parent.sub_node_instance_ids.is_none());
    }
}
