//! report.rs
//! Per (scenario, date) reduction of raw facts into aggregates.

use crate::aggregation::histogram::{generate_histogram, HistogramBucket};
use crate::aggregation::stats::SampleStats;
use crate::param::{Aspect, NumberParam, Param};
use crate::response::ops::{merge_response_aspect, response_histogram_aggregation};
use crate::response::{ResponseAspect, ResponseParam};
use crate::store::{MessageType, NodeFact, SimulationMessage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationMethod {
    Avg,
    Min,
    Max,
    Ninetieth,
    Ninetiefifth,
    Ninetieninth,
    Histogram,
    Aspects,
    Messages,
    ResponseAspects,
    Rate,
}

/// Quantile methods and the probability each one reports.
pub const QUANTILES: [(AggregationMethod, f64); 3] = [
    (AggregationMethod::Ninetieth, 0.9),
    (AggregationMethod::Ninetiefifth, 0.95),
    (AggregationMethod::Ninetieninth, 0.99),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRate {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub name: String,
    /// Percentage of trials in which the message fired, floored.
    pub rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Aggregate {
    Number(NumberParam),
    Histogram {
        buckets: Vec<HistogramBucket>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
    Aspects { values: Vec<Aspect> },
    ResponseAspects { values: Vec<ResponseAspect> },
    Messages { values: Vec<MessageRate> },
    Rate { value: u32 },
}

impl Aggregate {
    pub fn as_number(&self) -> Option<&NumberParam> {
        match self {
            Aggregate::Number(n) => Some(n),
            _ => None,
        }
    }
}

pub type StepAggregate = BTreeMap<AggregationMethod, Aggregate>;

/// What survives of one node for one (scenario, date).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedReport {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: StepAggregate,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response: StepAggregate,
}

impl AggregatedReport {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.response.is_empty()
    }

    pub fn methods(&self) -> impl Iterator<Item = AggregationMethod> + '_ {
        self.data.keys().chain(self.response.keys()).copied()
    }
}

/// A borrowed raw fact with the trial it came from.
#[derive(Debug, Clone, Copy)]
pub enum Sample<'a> {
    Param(&'a Param),
    Response(&'a ResponseParam),
    Message(&'a SimulationMessage),
}

impl<'a> From<&'a NodeFact> for Sample<'a> {
    fn from(fact: &'a NodeFact) -> Self {
        match fact {
            NodeFact::Param(Param::ResponseNumber(r)) => Sample::Response(r),
            NodeFact::Param(p) => Sample::Param(p),
            NodeFact::Message(m) => Sample::Message(m),
        }
    }
}

impl<'a> From<&'a ResponseParam> for Sample<'a> {
    fn from(r: &'a ResponseParam) -> Self {
        Sample::Response(r)
    }
}

enum Numeric<'a> {
    Plain(&'a NumberParam),
    Response(&'a ResponseParam),
}

/// The mean pass (no trial index) first, then trials in order.
pub fn order_samples<'a>(mut samples: Vec<(Option<u32>, Sample<'a>)>) -> Vec<Sample<'a>> {
    samples.sort_by_key(|(mc_run, _)| mc_run.map_or(0, |r| u64::from(r) + 1));
    samples.into_iter().map(|(_, s)| s).collect()
}

/// Floored percentage of hits after the first (mean-pass) sample.
fn rate(hits: &[bool]) -> u32 {
    match hits {
        [] => 0,
        [only] => {
            if *only {
                100
            } else {
                0
            }
        }
        [_, trials @ ..] => {
            let count = trials.iter().filter(|h| **h).count();
            (100.0 * count as f64 / trials.len() as f64).floor() as u32
        }
    }
}

/// Sums every slice over all samples, then inflates by `1 + 1/n`.
fn aggregate_aspects(numbers: &[&NumberParam]) -> Vec<Aspect> {
    if numbers.len() < 2 {
        return Vec::new();
    }
    let mut order: Vec<String> = Vec::new();
    let mut sums: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for number in numbers {
        for aspect in &number.aspects {
            if !sums.contains_key(&aspect.name) {
                order.push(aspect.name.clone());
            }
            let slices = sums.entry(aspect.name.clone()).or_default();
            for (slice, v) in &aspect.slices {
                *slices.entry(slice.clone()).or_insert(0.0) += v;
            }
        }
    }
    let n = numbers.len() as f64;
    order
        .into_iter()
        .filter_map(|name| {
            let slices = sums.remove(&name)?;
            Some(Aspect::new(name, slices.into_iter().map(|(k, v)| (k, v + v / n))))
        })
        .collect()
}

fn aggregate_response_aspects(responses: &[&ResponseParam]) -> Vec<ResponseAspect> {
    if responses.len() < 2 {
        return Vec::new();
    }
    let mut merged: Vec<ResponseAspect> = Vec::new();
    for response in responses {
        for aspect in &response.aspects {
            match merged.iter_mut().find(|a| a.name == aspect.name) {
                Some(existing) => *existing = merge_response_aspect(existing, aspect),
                None => merged.push(aspect.clone()),
            }
        }
    }
    merged
}

/// Average, extrema, quantiles and histogram of `values`, in `unit`.
pub fn number_statistics(values: &[f64], unit: Option<&str>, out: &mut StepAggregate) {
    let Some(stats) = SampleStats::new(values) else {
        return;
    };
    let number = |value: f64| {
        Aggregate::Number(NumberParam { value, unit: unit.map(str::to_string), aspects: Vec::new() })
    };
    out.insert(
        AggregationMethod::Histogram,
        Aggregate::Histogram { buckets: generate_histogram(values), unit: unit.map(str::to_string) },
    );
    out.insert(AggregationMethod::Avg, number(stats.mean()));
    out.insert(AggregationMethod::Min, number(stats.min()));
    out.insert(AggregationMethod::Max, number(stats.max()));
    for (method, p) in QUANTILES {
        out.insert(method, number(stats.quantile(p)));
    }
}

/// Reduces the ordered samples of one step.
///
/// The first numeric sample decides whether the step is read as plain
/// numbers or as response distributions.
pub fn aggregate_step(samples: &[Sample<'_>]) -> StepAggregate {
    let mut out = StepAggregate::new();

    // --- Numbers ---
    let numeric: Vec<Numeric> = samples
        .iter()
        .filter_map(|s| match s {
            Sample::Param(Param::Number(n)) => Some(Numeric::Plain(n)),
            Sample::Response(r) => Some(Numeric::Response(r)),
            _ => None,
        })
        .collect();
    match numeric.first() {
        Some(Numeric::Plain(base)) => {
            let numbers: Vec<&NumberParam> = numeric
                .iter()
                .filter_map(|n| match n {
                    Numeric::Plain(p) => Some(*p),
                    Numeric::Response(_) => None,
                })
                .collect();
            let values: Vec<f64> = numbers.iter().map(|n| n.value).collect();
            number_statistics(&values, base.unit.as_deref(), &mut out);
            if base.has_aspect() {
                let aspects = aggregate_aspects(&numbers);
                if !aspects.is_empty() {
                    out.insert(AggregationMethod::Aspects, Aggregate::Aspects { values: aspects });
                }
            }
        }
        Some(Numeric::Response(base)) => {
            let responses: Vec<&ResponseParam> = numeric
                .iter()
                .filter_map(|n| match n {
                    Numeric::Response(r) => Some(*r),
                    Numeric::Plain(_) => None,
                })
                .collect();
            let values = response_histogram_aggregation(responses.iter().copied());
            number_statistics(&values, Some(base.unit.as_str()), &mut out);
            if !base.aspects.is_empty() {
                let aspects = aggregate_response_aspects(&responses);
                if !aspects.is_empty() {
                    out.insert(AggregationMethod::ResponseAspects, Aggregate::ResponseAspects { values: aspects });
                }
            }
        }
        None => {}
    }

    // --- Messages ---
    let mut by_name: Vec<(MessageType, &str, Vec<bool>)> = Vec::new();
    for sample in samples {
        let Sample::Message(m) = sample else { continue };
        if !matches!(m.message_type, MessageType::Warning | MessageType::Error) {
            continue;
        }
        match by_name.iter_mut().find(|(_, name, _)| *name == m.name) {
            Some((_, _, hits)) => hits.push(!m.blank),
            None => by_name.push((m.message_type, m.name.as_str(), vec![!m.blank])),
        }
    }
    if !by_name.is_empty() {
        let values = by_name
            .into_iter()
            .map(|(message_type, name, hits)| MessageRate { message_type, name: name.to_string(), rate: rate(&hits) })
            .collect();
        out.insert(AggregationMethod::Messages, Aggregate::Messages { values });
    }

    // --- Booleans ---
    let booleans: Vec<bool> = samples
        .iter()
        .filter_map(|s| match s {
            Sample::Param(Param::Boolean { value }) => Some(*value),
            _ => None,
        })
        .collect();
    if !booleans.is_empty() {
        out.insert(AggregationMethod::Rate, Aggregate::Rate { value: rate(&booleans) });
    }

    out
}
