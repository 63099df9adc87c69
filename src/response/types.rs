//! Discrete distributions and the response records that carry them backwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Total frequency a normalized distribution sums to.
pub const NORM_FREQ: f64 = 1000.0;

pub const LATENCY_CATEGORY: &str = "latency";
pub const HOP_CATEGORY: &str = "hop";

/// Prefix of the response aspect a node adds to tag its own contribution.
pub const SOURCE_ASPECT_PREFIX: &str = "__source__";

/// One outcome of a distribution with its (un-normalized) weight.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseValueEntry {
    pub value: f64,
    pub freq: f64,
}

impl ResponseValueEntry {
    pub fn new(value: f64, freq: f64) -> Self {
        Self { value, freq }
    }
}

pub type ResponseValue = Vec<ResponseValueEntry>;

/// Builds a distribution from `(value, freq)` pairs.
pub fn dist(pairs: &[(f64, f64)]) -> ResponseValue {
    pairs.iter().map(|&(value, freq)| ResponseValueEntry { value, freq }).collect()
}

/// A breakdown of a response where every slice is itself a distribution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseAspect {
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub relative: bool,
    pub slices: BTreeMap<String, ResponseValue>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseParam {
    pub category: String,
    #[serde(default)]
    pub unit: String,
    pub value: ResponseValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aspects: Vec<ResponseAspect>,
}

impl ResponseParam {
    pub fn new(category: impl Into<String>, unit: impl Into<String>, value: ResponseValue) -> Self {
        Self { category: category.into(), unit: unit.into(), value, aspects: Vec::new() }
    }

    pub fn is_latency(&self) -> bool {
        self.category == LATENCY_CATEGORY && self.unit == "ms"
    }
}
