//! load_ops.rs
//! Aggregation of accepted loads and the breakdown (aspect) arithmetic behind it.

use crate::param::math_ops::add;
use crate::param::types::{Aspect, NumberParam, Param, UNKNOWN_SLICE};
use std::collections::BTreeMap;

// --- Aggregation ---

/// Reduces the loads accepted by one node to a single value.
///
/// Numbers are summed (booleans count as 0/1 once any number is present),
/// all-boolean input is AND-ed, anything else yields the first element.
pub fn aggregate_params(params: &[Param]) -> Option<Param> {
    match params {
        [] => None,
        [single] => Some(single.clone()),
        _ => {
            if params.iter().any(Param::is_number) {
                let mut sum = NumberParam::new(0.0);
                let mut unit_selected = false;
                for p in params {
                    match p {
                        Param::Number(n) => {
                            sum = add(&sum, n);
                            // The first contributing number decides the unit
                            if !unit_selected {
                                sum.unit = n.unit.clone();
                                unit_selected = true;
                            }
                        }
                        Param::Boolean { value } => {
                            sum = add(&sum, &NumberParam::new(if *value { 1.0 } else { 0.0 }));
                        }
                        _ => {}
                    }
                }
                Some(Param::Number(sum))
            } else if params.iter().any(Param::is_boolean) {
                let all_true = params
                    .iter()
                    .all(|p| !matches!(p, Param::Boolean { value: false }));
                Some(Param::boolean(all_true))
            } else {
                Some(params[0].clone())
            }
        }
    }
}

// --- Breakdown arithmetic ---

/// Rescales the slices so they add up to `scale_to`; the result is absolute.
pub fn scale_breakdown(scale_to: f64, breakdown: &Aspect) -> Aspect {
    let mut slice_sum = breakdown.slice_sum();
    if slice_sum == 0.0 {
        slice_sum = 1.0;
    }
    let scale = scale_to / slice_sum;
    Aspect {
        name: breakdown.name.clone(),
        relative: false,
        slices: breakdown.slices.iter().map(|(k, v)| (k.clone(), v * scale)).collect(),
    }
}

pub fn scale_breakdowns(value: f64, breakdowns: &[Aspect]) -> Vec<Aspect> {
    breakdowns.iter().map(|b| scale_breakdown(value, b)).collect()
}

/// Adds an "unknown" slice covering whatever part of `value` the known slices
/// do not explain. Returns the aspect unchanged if nothing is missing.
pub fn pad_aspect(value: f64, aspect: &Aspect) -> Aspect {
    let known = aspect.slice_sum_known();
    if value <= known {
        return aspect.clone();
    }
    let mut slices: BTreeMap<String, f64> = aspect
        .slices
        .iter()
        .filter(|(name, _)| name.as_str() != UNKNOWN_SLICE)
        .map(|(k, v)| (k.clone(), *v))
        .collect();
    slices.insert(UNKNOWN_SLICE.to_string(), value - known);
    Aspect { name: aspect.name.clone(), relative: false, slices }
}

fn add_single_aspect(a: &Aspect, b: &Aspect) -> Aspect {
    let mut out = Aspect { name: a.name.clone(), relative: a.relative, slices: a.slices.clone() };
    for (slice, v) in &b.slices {
        *out.slices.entry(slice.clone()).or_insert(0.0) += v;
    }
    out
}

/// Combines the breakdowns of two summands.
///
/// 1. Each side's aspects are scaled to that side's value.
/// 2. Aspects both sides carry are summed slice by slice.
/// 3. One-sided aspects are padded with "unknown" up to `|a| + |b|`.
pub fn add_aspects(a_val: f64, a_aspects: &[Aspect], b_val: f64, b_aspects: &[Aspect]) -> Vec<Aspect> {
    let sum = a_val.abs() + b_val.abs();
    let mut applied_a = scale_breakdowns(a_val, a_aspects);
    let mut applied_b = scale_breakdowns(b_val, b_aspects);

    let common: Vec<String> = applied_a
        .iter()
        .filter(|a| applied_b.iter().any(|b| b.name == a.name))
        .map(|a| a.name.clone())
        .collect();

    let mut result = Vec::with_capacity(applied_a.len() + applied_b.len());
    for name in &common {
        let a = take_last_named(&mut applied_a, name);
        let b = take_last_named(&mut applied_b, name);
        if let (Some(a), Some(b)) = (a, b) {
            result.push(add_single_aspect(&a, &b));
        }
    }
    result.extend(applied_a.iter().map(|a| pad_aspect(sum, a)));
    result.extend(applied_b.iter().map(|b| pad_aspect(sum, b)));
    result
}

/// Removes every aspect called `name`, returning the last one.
fn take_last_named(aspects: &mut Vec<Aspect>, name: &str) -> Option<Aspect> {
    let mut last = None;
    aspects.retain(|a| {
        if a.name == name {
            last = Some(a.clone());
            false
        } else {
            true
        }
    });
    last
}

/// Restricts a number to one slice of one of its breakdowns.
///
/// Returns a zero number if the breakdown is absent and `None` if the slice
/// is absent or zero.
pub fn filter_by_breakdown_slice(val: &NumberParam, breakdown: &str, slice: &str) -> Option<NumberParam> {
    let mut res = NumberParam { value: 0.0, unit: val.unit.clone(), aspects: Vec::new() };
    let Some(filter) = val.aspects.iter().rev().find(|a| a.name == breakdown) else {
        return Some(res);
    };
    let slice_val = filter.slices.get(slice).copied().filter(|v| *v != 0.0)?;

    res.value = if filter.relative { val.value * slice_val } else { slice_val };
    for a in &val.aspects {
        if a.name == breakdown {
            let mut slices = BTreeMap::new();
            slices.insert(slice.to_string(), if a.relative { 1.0 } else { res.value });
            res.aspects.push(Aspect { name: a.name.clone(), relative: a.relative, slices });
        } else if a.relative {
            res.aspects.push(a.clone());
        } else {
            res.aspects.push(scale_breakdown(res.value, a));
        }
    }
    Some(res)
}

/// Turns absolute slices into fractions of their total.
pub fn make_breakdown_relative(breakdown: &Aspect) -> Aspect {
    if breakdown.relative {
        return breakdown.clone();
    }
    let mut slice_sum = breakdown.slice_sum();
    if slice_sum == 0.0 {
        slice_sum = 1.0;
    }
    Aspect {
        name: breakdown.name.clone(),
        relative: true,
        slices: breakdown.slices.iter().map(|(k, v)| (k.clone(), v / slice_sum)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn aspect(name: &str, slices: &[(&str, f64)]) -> Aspect {
        Aspect::new(name, slices.iter().map(|(k, v)| (k.to_string(), *v)))
    }

    #[test]
    fn test_aggregate_two_numbers() {
        let res = aggregate_params(&[Param::number(10.0), Param::number(20.0)]);
        assert_eq!(res, Some(Param::number(30.0)));
    }

    #[test]
    fn test_aggregate_single_is_identity() {
        let p = Param::Number(NumberParam::new(3.0).with_unit("rps"));
        assert_eq!(aggregate_params(std::slice::from_ref(&p)), Some(p));
        assert_eq!(aggregate_params(&[]), None);
    }

    #[rstest]
    #[case(&[Some("rps"), Some("rps")], Some("rps"))]
    #[case(&[Some("rps"), Some("tps")], None)]
    #[case(&[None, Some("tps")], None)]
    fn test_aggregate_units(#[case] units: &[Option<&str>], #[case] expected: Option<&str>) {
        let params: Vec<Param> = units
            .iter()
            .map(|u| {
                let mut n = NumberParam::new(1.0);
                n.unit = u.map(str::to_string);
                Param::Number(n)
            })
            .collect();
        let res = aggregate_params(&params).unwrap();
        assert_eq!(res.as_number().unwrap().unit.as_deref(), expected);
    }

    #[test]
    fn test_aggregate_coerces_booleans_next_to_numbers() {
        let res = aggregate_params(&[Param::number(2.0), Param::boolean(true), Param::boolean(false)]);
        assert_eq!(res.unwrap().as_number().unwrap().value, 3.0);
    }

    #[rstest]
    #[case(&[true, true], true)]
    #[case(&[true, false], false)]
    fn test_aggregate_booleans_are_anded(#[case] values: &[bool], #[case] expected: bool) {
        let params: Vec<Param> = values.iter().map(|v| Param::boolean(*v)).collect();
        assert_eq!(aggregate_params(&params), Some(Param::boolean(expected)));
    }

    #[test]
    fn test_aggregate_other_kinds_returns_first() {
        let a = Param::String { value: "a".into() };
        let b = Param::String { value: "b".into() };
        assert_eq!(aggregate_params(&[a.clone(), b]), Some(a));
    }

    #[test]
    fn test_add_aspects_common_name() {
        let os = aspect("os", &[("ios", 5.0), ("android", 5.0)]);
        let res = add_aspects(10.0, std::slice::from_ref(&os), 10.0, std::slice::from_ref(&os));
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].slices.get("ios"), Some(&10.0));
        assert_eq!(res[0].slices.get("android"), Some(&10.0));
    }

    #[test]
    fn test_add_aspects_pads_one_sided() {
        let os = aspect("os", &[("ios", 1.0), ("android", 3.0)]);
        let res = add_aspects(4.0, &[os], 6.0, &[]);
        assert_eq!(res.len(), 1);
        assert_relative_eq!(res[0].slices["ios"], 1.0);
        assert_relative_eq!(res[0].slices["android"], 3.0);
        assert_relative_eq!(res[0].slices[UNKNOWN_SLICE], 6.0);
    }

    #[test]
    fn test_pad_aspect_noop_when_covered() {
        let os = aspect("os", &[("ios", 5.0), (UNKNOWN_SLICE, 2.0)]);
        assert_eq!(pad_aspect(5.0, &os), os);
        let padded = pad_aspect(8.0, &os);
        assert_eq!(padded.slices[UNKNOWN_SLICE], 3.0);
    }

    #[test]
    fn test_scale_breakdown_zero_sum() {
        let zero = aspect("os", &[("ios", 0.0)]);
        assert_eq!(scale_breakdown(10.0, &zero).slices["ios"], 0.0);
        let rel = aspect("os", &[("ios", 1.0), ("android", 3.0)]).relative();
        let scaled = scale_breakdown(8.0, &rel);
        assert!(!scaled.relative);
        assert_eq!(scaled.slices["android"], 6.0);
    }

    #[test]
    fn test_make_breakdown_relative() {
        let abs = aspect("os", &[("ios", 1.0), ("android", 3.0)]);
        let rel = make_breakdown_relative(&abs);
        assert!(rel.relative);
        assert_eq!(rel.slices["ios"], 0.25);
        assert_eq!(make_breakdown_relative(&rel), rel);
    }

    #[test]
    fn test_filter_by_breakdown_slice() {
        let n = NumberParam::new(10.0).with_aspects(vec![
            aspect("os", &[("ios", 4.0), ("android", 6.0)]),
            aspect("region", &[("eu", 0.5), ("us", 0.5)]).relative(),
            aspect("tier", &[("gold", 2.0), ("free", 8.0)]),
        ]);
        let res = filter_by_breakdown_slice(&n, "os", "ios").unwrap();
        assert_eq!(res.value, 4.0);
        assert_eq!(res.aspects[0].slices.len(), 1);
        assert_eq!(res.aspects[0].slices["ios"], 4.0);
        assert_eq!(res.aspects[1], n.aspects[1]);
        assert_relative_eq!(res.aspects[2].slices["gold"], 0.8);

        assert_eq!(filter_by_breakdown_slice(&n, "os", "web"), None);
        assert_eq!(filter_by_breakdown_slice(&n, "device", "web").unwrap().value, 0.0);
    }
}
