//! Post-run aggregation: raw facts of every node are reduced per
//! (scenario, date) into statistics, and breakdowns are split out into
//! synthetic child nodes.
pub mod histogram;
pub mod report;
pub mod stats;
pub mod synthetic;

pub use histogram::{generate_histogram, HistogramBucket};
pub use report::{Aggregate, AggregatedReport, AggregationMethod, MessageRate, StepAggregate};
pub use stats::SampleStats;

use crate::store::{NodeStore, ScenarioReports, SimulationNode};
use report::{aggregate_step, order_samples, Sample};
use std::collections::{BTreeMap, BTreeSet};
use synthetic::{split_response_categories, BreakdownNodes};
use tracing::info;

/// Reports of one node over all requested scenarios and dates. Steps
/// without any aggregate are left out.
pub fn aggregate_node_report(node: &SimulationNode, scenarios: &[String], dates: &[String]) -> ScenarioReports {
    let mut reports = ScenarioReports::new();
    for scenario in scenarios {
        for date in dates {
            let at = |s: &String, d: &String| s == scenario && d == date;
            let data = order_samples(
                node.raw_data
                    .iter()
                    .filter(|e| at(&e.scenario_id, &e.step_date))
                    .map(|e| (e.mc_run, Sample::from(&e.data)))
                    .collect(),
            );
            let response = order_samples(
                node.raw_responses
                    .iter()
                    .filter(|e| at(&e.scenario_id, &e.step_date))
                    .map(|e| (e.mc_run, Sample::from(&e.data)))
                    .collect(),
            );
            let report = AggregatedReport { data: aggregate_step(&data), response: aggregate_step(&response) };
            if !report.is_empty() {
                reports.entry(scenario.clone()).or_default().insert(date.clone(), report);
            }
        }
    }
    reports
}

fn aggregate_node(node: &mut SimulationNode, scenarios: &[String], dates: &[String]) {
    node.aggregated_report = aggregate_node_report(node, scenarios, dates);
    let methods: BTreeSet<AggregationMethod> = node
        .aggregated_report
        .values()
        .flat_map(|dates| dates.values())
        .flat_map(AggregatedReport::methods)
        .collect();
    node.aggregation_methods = methods.into_iter().collect();
}

/// Aggregates every node of a finished run.
///
/// 1. Nodes whose responses mix categories get one child per category.
/// 2. Every node is reduced per (scenario, date).
/// 3. Aspect and response-aspect breakdowns become BREAKDOWN/SLICE nodes.
/// 4. Raw facts are dropped.
pub fn aggregate(store: NodeStore, scenarios: &[String], dates: &[String]) -> NodeStore {
    let mut nodes: BTreeMap<String, SimulationNode> = store.into_nodes();

    // 1.
    let mut categories = Vec::new();
    for node in nodes.values_mut() {
        categories.extend(split_response_categories(node));
    }
    for child in categories {
        nodes.insert(child.object_id.clone(), child);
    }

    // 2.
    for node in nodes.values_mut() {
        aggregate_node(node, scenarios, dates);
    }

    // 3.
    let mut breakdowns = BreakdownNodes::new();
    for node in nodes.values_mut() {
        breakdowns.collect(node);
    }
    let breakdowns = breakdowns.into_nodes();
    let breakdown_count = breakdowns.len();
    nodes.extend(breakdowns);

    // 4.
    for node in nodes.values_mut() {
        node.raw_data = Vec::new();
        node.raw_responses = Vec::new();
    }

    info!(
        nodes = nodes.len(),
        breakdowns = breakdown_count,
        scenarios = scenarios.len(),
        dates = dates.len(),
        "aggregation done"
    );
    NodeStore::from_nodes(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{gen_sim_id, NodeType};
    use crate::param::{Aspect, NumberParam, Param};
    use crate::response::types::dist;
    use crate::response::ResponseParam;
    use crate::store::StepCursor;

    fn cursor(scenario: &str, date: &str, mc_run: Option<u32>) -> StepCursor {
        StepCursor { scenario_id: scenario.into(), step_date: date.into(), mc_run }
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reports_per_scenario_and_date() {
        let mut store = NodeStore::new();
        store.register(SimulationNode::new("n", NodeType::ProcessOutport));
        for (scenario, value) in [("a", 1.0), ("b", 5.0)] {
            store.store_raw_data("n", &cursor(scenario, "2024-01", None), Param::number(value).into());
            store.store_raw_data("n", &cursor(scenario, "2024-01", Some(0)), Param::number(value + 2.0).into());
        }
        let out = aggregate(store, &ids(&["a", "b"]), &ids(&["2024-01", "2024-02"]));
        let node = out.get("n").unwrap();

        let avg = |s: &str| node.aggregated_report[s]["2024-01"].data[&AggregationMethod::Avg].as_number().unwrap().value;
        assert_eq!(avg("a"), 2.0);
        assert_eq!(avg("b"), 6.0);
        assert!(!node.aggregated_report["a"].contains_key("2024-02"));
        assert!(node.raw_data.is_empty());
        assert!(node.aggregation_methods.contains(&AggregationMethod::Histogram));
        assert!(!node.aggregation_methods.contains(&AggregationMethod::Rate));
    }

    #[test]
    fn test_unaggregated_node_has_no_methods() {
        let mut store = NodeStore::new();
        store.register(SimulationNode::new("n", NodeType::GraphModel));
        let out = aggregate(store, &ids(&["a"]), &ids(&["2024-01"]));
        let node = out.get("n").unwrap();
        assert!(node.aggregation_methods.is_empty());
        assert!(node.aggregated_report.is_empty());
    }

    #[test]
    fn test_breakdowns_and_categories_are_added() {
        let mut store = NodeStore::new();
        store.register(SimulationNode::new("n", NodeType::ProcessOutport));
        let aspect = Aspect::new("region", [("eu".to_string(), 1.0), ("us".to_string(), 1.0)]);
        for mc_run in [None, Some(0)] {
            let c = cursor("a", "2024-01", mc_run);
            store.store_raw_data("n", &c, Param::Number(NumberParam::new(4.0).with_aspects(vec![aspect.clone()])).into());
            store.store_raw_responses(
                "n",
                &c,
                &[
                    ResponseParam::new("latency", "ms", dist(&[(5.0, 1000.0)])),
                    ResponseParam::new("hop", "", dist(&[(1.0, 1000.0)])),
                ],
            );
        }
        let out = aggregate(store, &ids(&["a"]), &ids(&["2024-01"]));

        let latency = out.get(&gen_sim_id(&["latency"], "n")).unwrap();
        assert_eq!(
            latency.aggregated_report["a"]["2024-01"].response[&AggregationMethod::Avg].as_number().unwrap().value,
            5.0
        );
        let region = gen_sim_id(&["region"], "n");
        assert_eq!(out.get(&region).unwrap().node_type, NodeType::Breakdown);
        let eu = out.get(&gen_sim_id(&["region", "eu"], &region)).unwrap();
        assert_eq!(
            eu.aggregated_report["a"]["2024-01"].data[&AggregationMethod::Avg].as_number().unwrap().value,
            2.0
        );
        let parent = out.get("n").unwrap();
        assert_eq!(parent.sub_node_instance_ids.as_ref().map(Vec::len), Some(3));
        assert!(parent.aggregated_report["a"]["2024-01"].response.is_empty());
    }
}
