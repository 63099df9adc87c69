//! ops.rs
//! Elementary operations on distributions: normalization, merging, means and
//! the flat sample expansion used for histograms.

use crate::param::types::Aspect;
use crate::response::types::{
    ResponseAspect, ResponseParam, ResponseValue, ResponseValueEntry, HOP_CATEGORY, LATENCY_CATEGORY,
    NORM_FREQ,
};

/// Rounds half away from zero for positives and towards +inf at .5 for
/// negatives, matching how frequencies have always been rounded.
pub fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// The placeholder distribution for a branch that reports nothing.
pub fn zero_value() -> ResponseValue {
    vec![ResponseValueEntry::new(0.0, NORM_FREQ)]
}

pub fn response_value_entry(value: &ResponseValue, outcome: f64) -> Option<&ResponseValueEntry> {
    value.iter().find(|e| e.value == outcome)
}

/// Adds `entry` to `value`, coalescing with an existing equal outcome.
pub fn add_entry(value: &mut ResponseValue, entry: ResponseValueEntry) {
    match value.iter_mut().find(|e| e.value == entry.value) {
        Some(existing) => existing.freq += entry.freq,
        None => value.push(entry),
    }
}

/// Mean of a normalized distribution.
pub fn response_value_mean(value: &ResponseValue) -> f64 {
    value.iter().map(|e| (e.freq * e.value).abs()).sum::<f64>() / NORM_FREQ
}

/// Rescales frequencies to sum to `norm` and rounds outcomes and frequencies.
/// A distribution with zero total weight becomes empty.
pub fn scale_frequencies(value: &ResponseValue, norm: f64) -> ResponseValue {
    let norm = round_half_up(norm);
    let freq_sum: f64 = value.iter().map(|e| e.freq.abs()).sum();
    if freq_sum == 0.0 {
        return Vec::new();
    }
    let factor = norm / freq_sum;
    value
        .iter()
        .map(|e| ResponseValueEntry::new(round_half_up(e.value), round_half_up(e.freq * factor)))
        .collect()
}

pub fn normalize(value: &ResponseValue) -> ResponseValue {
    scale_frequencies(value, NORM_FREQ)
}

/// Coalesces entries with equal outcomes.
pub fn unify_response_value(value: &ResponseValue) -> ResponseValue {
    let mut unified = Vec::with_capacity(value.len());
    for e in value {
        add_entry(&mut unified, *e);
    }
    unified
}

/// Union of both distributions with frequencies of equal outcomes summed.
/// Zero outcomes of `b` are skipped. The result is not renormalized.
pub fn merge(a: &ResponseValue, b: &ResponseValue) -> ResponseValue {
    let mut merged = a.clone();
    for e in b.iter().filter(|e| e.value != 0.0) {
        add_entry(&mut merged, *e);
    }
    merged
}

fn normalize_response_aspect(aspect: &ResponseAspect) -> ResponseAspect {
    ResponseAspect {
        name: aspect.name.clone(),
        relative: aspect.relative,
        slices: aspect.slices.iter().map(|(k, v)| (k.clone(), normalize(v))).collect(),
    }
}

/// Merges the slices of two same-named response aspects and normalizes them.
pub fn merge_response_aspect(a: &ResponseAspect, b: &ResponseAspect) -> ResponseAspect {
    let mut merged = a.clone();
    for (slice, value) in &b.slices {
        let next = match merged.slices.get(slice) {
            Some(existing) => merge(existing, value),
            None => value.clone(),
        };
        merged.slices.insert(slice.clone(), next);
    }
    normalize_response_aspect(&merged)
}

/// Reduces each slice to the mean of its distribution.
pub fn flatten_response_aspect_value(aspect: &ResponseAspect) -> Aspect {
    Aspect::new(
        aspect.name.clone(),
        aspect.slices.iter().map(|(k, v)| (k.clone(), response_value_mean(v))),
    )
}

fn build_response_aspect(value: &ResponseValue, aspect: &Aspect) -> ResponseAspect {
    ResponseAspect {
        name: aspect.name.clone(),
        relative: aspect.relative,
        slices: aspect.slices.keys().map(|k| (k.clone(), value.clone())).collect(),
    }
}

fn make_point_response(category: &str, unit: &str, val: f64, aspects: &[Aspect]) -> ResponseParam {
    let value = vec![ResponseValueEntry::new(val, NORM_FREQ)];
    let mut response = ResponseParam::new(category, unit, value);
    response.aspects = aspects.iter().map(|a| build_response_aspect(&response.value, a)).collect();
    response
}

/// A certain latency of `val` ms, broken down along the given load aspects.
pub fn make_latency_response(val: f64, aspects: &[Aspect]) -> ResponseParam {
    make_point_response(LATENCY_CATEGORY, "ms", val, aspects)
}

pub fn make_hop_response(hops: f64, aspects: &[Aspect]) -> ResponseParam {
    make_point_response(HOP_CATEGORY, "", hops, aspects)
}

// --- Histogram input ---

/// Expands a distribution into a flat list of outcomes, each repeated in
/// proportion to its frequency relative to the smallest one.
pub fn response_value_histogram_aggregation(value: &ResponseValue) -> Vec<f64> {
    let min = value
        .iter()
        .map(|e| e.freq)
        .filter(|f| *f >= 1.0)
        .fold(NORM_FREQ, f64::min);

    let mut samples = Vec::new();
    for e in value {
        let mut freq = e.freq;
        while freq >= min {
            samples.push(e.value);
            freq -= min;
        }
    }
    samples
}

/// Unifies all response distributions and expands them into samples.
pub fn response_histogram_aggregation<'a>(responses: impl IntoIterator<Item = &'a ResponseParam>) -> Vec<f64> {
    let mut unified = Vec::new();
    for r in responses {
        for e in &r.value {
            add_entry(&mut unified, *e);
        }
    }
    response_value_histogram_aggregation(&unified)
}
