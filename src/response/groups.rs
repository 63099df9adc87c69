//! groups.rs
//! Category- and aspect-aware combination of response groups.
//!
//! A response group is everything one branch reports back (one response per
//! category). Combining groups partitions by category first; a branch lacking
//! a category contributes a placeholder distribution. Response aspects are
//! combined slice by slice with the same placeholder rule.

use crate::response::cartesian::{aggregate_response_values, Reducer};
use crate::response::ops::zero_value;
use crate::response::types::{ResponseAspect, ResponseParam, ResponseValue};
use std::collections::BTreeMap;

/// Branch view of one category: the response and its aspects by name.
struct BranchCategory<'a> {
    response: &'a ResponseParam,
    aspects: BTreeMap<&'a str, &'a ResponseAspect>,
}

/// Union of aspect and slice names seen for one category, in first-seen order.
#[derive(Default)]
struct CategoryShape {
    unit: String,
    aspects: Vec<(String, Vec<String>)>,
}

impl CategoryShape {
    fn note_aspect(&mut self, aspect: &ResponseAspect) {
        let idx = match self.aspects.iter().position(|(name, _)| *name == aspect.name) {
            Some(i) => i,
            None => {
                self.aspects.push((aspect.name.clone(), Vec::new()));
                self.aspects.len() - 1
            }
        };
        let slices = &mut self.aspects[idx].1;
        for slice in aspect.slices.keys() {
            if !slices.contains(slice) {
                slices.push(slice.clone());
            }
        }
    }
}

/// Combines response groups with `reducer`.
///
/// `undefined_category` supplies the distribution for a branch missing a
/// category; `undefined_slice` the one for a branch whose aspect lacks a
/// slice (`None` leaves that branch out of the slice).
pub fn aggregate_response_groups(
    groups: &[Vec<ResponseParam>],
    reducer: Reducer,
    undefined_category: impl Fn(&str) -> ResponseValue,
    undefined_slice: impl Fn(&str, &str) -> Option<ResponseValue>,
) -> Vec<ResponseParam> {
    // 1. Index every branch by category and record the union of shapes
    let mut categories: Vec<(String, CategoryShape)> = Vec::new();
    let mut branches: Vec<BTreeMap<&str, BranchCategory>> = Vec::with_capacity(groups.len());
    for group in groups {
        let mut by_category = BTreeMap::new();
        for response in group {
            let shape = match categories.iter().position(|(c, _)| *c == response.category) {
                Some(i) => &mut categories[i].1,
                None => {
                    let shape = CategoryShape { unit: response.unit.clone(), aspects: Vec::new() };
                    categories.push((response.category.clone(), shape));
                    let last = categories.len() - 1;
                    &mut categories[last].1
                }
            };
            let mut aspects = BTreeMap::new();
            for aspect in &response.aspects {
                shape.note_aspect(aspect);
                aspects.insert(aspect.name.as_str(), aspect);
            }
            by_category.insert(response.category.as_str(), BranchCategory { response, aspects });
        }
        branches.push(by_category);
    }

    // 2. One combined response per category
    let mut combined = Vec::with_capacity(categories.len());
    for (category, shape) in &categories {
        let values: Vec<ResponseValue> = branches
            .iter()
            .map(|b| match b.get(category.as_str()) {
                Some(bc) => bc.response.value.clone(),
                None => undefined_category(category),
            })
            .collect();
        let mut response = ResponseParam::new(
            category.clone(),
            shape.unit.clone(),
            aggregate_response_values(&values, reducer),
        );

        // 3. Aspects, slice by slice
        for (aspect_name, slice_names) in &shape.aspects {
            let mut aspect = ResponseAspect { name: aspect_name.clone(), relative: false, slices: BTreeMap::new() };
            for slice in slice_names {
                let mut slice_values = Vec::with_capacity(branches.len());
                for b in &branches {
                    match b.get(category.as_str()) {
                        Some(bc) => match bc.aspects.get(aspect_name.as_str()) {
                            Some(a) => match a.slices.get(slice) {
                                Some(v) => slice_values.push(v.clone()),
                                None => slice_values.extend(undefined_slice(aspect_name, slice)),
                            },
                            None => slice_values.push(bc.response.value.clone()),
                        },
                        None => slice_values.push(undefined_category(category)),
                    }
                }
                aspect.slices.insert(slice.clone(), aggregate_response_values(&slice_values, reducer));
            }
            response.aspects.push(aspect);
        }
        combined.push(response);
    }
    combined
}

fn zero_category(_: &str) -> ResponseValue {
    zero_value()
}

fn zero_slice(_: &str, _: &str) -> Option<ResponseValue> {
    Some(zero_value())
}

/// Worst-of combination: the slowest branch dominates.
pub fn max_response_groups(groups: &[Vec<ResponseParam>]) -> Vec<ResponseParam> {
    aggregate_response_groups(groups, Reducer::Max, zero_category, zero_slice)
}

/// Serial combination: branch outcomes add up.
pub fn add_response_groups(groups: &[Vec<ResponseParam>]) -> Vec<ResponseParam> {
    aggregate_response_groups(groups, Reducer::Add, zero_category, zero_slice)
}

/// Mixture of independent consumers.
pub fn combine_response_groups(groups: &[Vec<ResponseParam>]) -> Vec<ResponseParam> {
    aggregate_response_groups(groups, Reducer::Combine, zero_category, zero_slice)
}

/// Mixture where branch `i` is weighted by `weights[i]`.
///
/// Outcome values are scaled by `(w / Σw) · n` before combining. A zero
/// weight total falls back to the unweighted combination.
pub fn combine_response_groups_weighted(
    groups: &[Vec<ResponseParam>],
    weights: &[f64],
    undefined_slice: impl Fn(&str, &str) -> Option<ResponseValue>,
) -> Vec<ResponseParam> {
    let weight_sum: f64 = weights.iter().sum();
    if weight_sum == 0.0 {
        return combine_response_groups(groups);
    }
    let n = groups.len() as f64;
    let weighted: Vec<Vec<ResponseParam>> = groups
        .iter()
        .enumerate()
        .map(|(i, group)| {
            let w = weights.get(i).copied().unwrap_or(0.0) / weight_sum * n;
            group
                .iter()
                .map(|r| {
                    let mut scaled = r.clone();
                    for e in &mut scaled.value {
                        e.value *= w;
                    }
                    scaled
                })
                .collect()
        })
        .collect();
    aggregate_response_groups(&weighted, Reducer::Combine, zero_category, undefined_slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::types::dist;

    fn latency(pairs: &[(f64, f64)]) -> ResponseParam {
        ResponseParam::new("latency", "ms", dist(pairs))
    }

    fn with_aspect(mut r: ResponseParam, name: &str, slices: &[(&str, ResponseValue)]) -> ResponseParam {
        r.aspects.push(ResponseAspect {
            name: name.to_string(),
            relative: false,
            slices: slices.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        });
        r
    }

    #[test]
    fn test_add_groups_per_category() {
        let groups = vec![
            vec![latency(&[(10.0, 1000.0)]), ResponseParam::new("hop", "", dist(&[(1.0, 1000.0)]))],
            vec![latency(&[(5.0, 1000.0)])],
        ];
        let res = add_response_groups(&groups);
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].category, "latency");
        assert_eq!(res[0].value, dist(&[(15.0, 1000.0)]));
        // missing hop in the second branch counts as zero
        assert_eq!(res[1].value, dist(&[(1.0, 1000.0)]));
    }

    #[test]
    fn test_max_groups_keeps_worst() {
        let groups = vec![vec![latency(&[(10.0, 1000.0)])], vec![latency(&[(30.0, 1000.0)])]];
        assert_eq!(max_response_groups(&groups)[0].value, dist(&[(30.0, 1000.0)]));
    }

    #[test]
    fn test_missing_aspect_uses_branch_value() {
        let tagged = with_aspect(
            latency(&[(10.0, 1000.0)]),
            "os",
            &[("ios", dist(&[(10.0, 1000.0)]))],
        );
        let untagged = latency(&[(20.0, 1000.0)]);
        let res = add_response_groups(&[vec![tagged], vec![untagged]]);
        assert_eq!(res[0].aspects.len(), 1);
        assert_eq!(res[0].aspects[0].slices["ios"], dist(&[(30.0, 1000.0)]));
    }

    #[test]
    fn test_missing_slice_uses_placeholder() {
        let a = with_aspect(latency(&[(10.0, 1000.0)]), "os", &[("ios", dist(&[(10.0, 1000.0)]))]);
        let b = with_aspect(latency(&[(20.0, 1000.0)]), "os", &[("web", dist(&[(20.0, 1000.0)]))]);
        let res = combine_response_groups(&[vec![a], vec![b]]);
        let slices = &res[0].aspects[0].slices;
        assert_eq!(slices["ios"], dist(&[(10.0, 500.0), (0.0, 500.0)]));
        assert_eq!(slices["web"], dist(&[(0.0, 500.0), (20.0, 500.0)]));
    }

    #[test]
    fn test_weighted_combine_scales_values() {
        let groups = vec![vec![latency(&[(10.0, 1000.0)])], vec![latency(&[(10.0, 1000.0)])]];
        let res = combine_response_groups_weighted(&groups, &[3.0, 1.0], |_, _| None);
        assert_eq!(res[0].value, dist(&[(15.0, 500.0), (5.0, 500.0)]));
    }

    #[test]
    fn test_weighted_combine_zero_weights_falls_back() {
        let groups = vec![vec![latency(&[(10.0, 1000.0)])], vec![latency(&[(20.0, 1000.0)])]];
        let weighted = combine_response_groups_weighted(&groups, &[0.0, 0.0], |_, _| None);
        assert_eq!(weighted, combine_response_groups(&groups));
    }

    #[test]
    fn test_no_groups() {
        assert!(add_response_groups(&[]).is_empty());
    }
}
