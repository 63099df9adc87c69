//! math_ops.rs
//! Arithmetic over number parameters. Unit and aspect policies here are
//! deliberately asymmetric and must stay that way.

use crate::error::{Result, SimError};
use crate::param::load_ops::add_aspects;
use crate::param::types::{NumberParam, Param};

/// Sum of two numbers. The unit survives only if both sides agree.
pub fn add(a: &NumberParam, b: &NumberParam) -> NumberParam {
    let unit = if a.unit == b.unit { a.unit.clone() } else { None };
    let aspects = if a.has_aspect() || b.has_aspect() {
        add_aspects(a.value, &a.aspects, b.value, &b.aspects)
    } else {
        Vec::new()
    };
    NumberParam { value: a.value + b.value, unit, aspects }
}

/// Product of two numbers.
///
/// Takes the left unit, falling back to the right one when the left is unset.
/// Only the left operand's aspects are kept.
pub fn multiply(a: &NumberParam, b: &NumberParam) -> NumberParam {
    NumberParam {
        value: a.value * b.value,
        unit: a.unit.clone().or_else(|| b.unit.clone()),
        aspects: a.aspects.clone(),
    }
}

/// Smallest value; the first candidate wins ties.
pub fn min(params: &[NumberParam]) -> Result<NumberParam> {
    pick(params, "min", |best, current| current.value < best.value)
}

/// Largest value; the first candidate wins ties.
pub fn max(params: &[NumberParam]) -> Result<NumberParam> {
    pick(params, "max", |best, current| current.value > best.value)
}

fn pick(
    params: &[NumberParam],
    op: &'static str,
    better: impl Fn(&NumberParam, &NumberParam) -> bool,
) -> Result<NumberParam> {
    let (first, rest) = params.split_first().ok_or(SimError::EmptyInput { op })?;
    let mut best = first;
    for current in rest {
        if better(best, current) {
            best = current;
        }
    }
    Ok(best.clone())
}

// --- Param-level entry points used by processing elements ---

fn expect_number<'a>(p: &'a Param, op: &'static str) -> Result<&'a NumberParam> {
    p.as_number().ok_or(SimError::NotANumber { op })
}

pub fn add_params(a: &Param, b: &Param) -> Result<NumberParam> {
    Ok(add(expect_number(a, "add")?, expect_number(b, "add")?))
}

pub fn multiply_params(a: &Param, b: &Param) -> Result<NumberParam> {
    Ok(multiply(expect_number(a, "multiply")?, expect_number(b, "multiply")?))
}

/// Collects the numbers out of `params`, failing on the first non-number.
pub fn numbers<'a>(params: impl IntoIterator<Item = &'a Param>, op: &'static str) -> Result<Vec<NumberParam>> {
    params.into_iter().map(|p| expect_number(p, op).cloned()).collect()
}
