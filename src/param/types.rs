//! The tagged value type that flows forward through the graph as "load".

use crate::param::random::RandomParam;
use crate::response::ResponseParam;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Slice name reserved for magnitude no breakdown can be attributed to.
pub const UNKNOWN_SLICE: &str = "unknown";

/// A named partition of a numeric value.
///
/// `relative` aspects hold fractions of the carried value; absolute aspects
/// hold magnitudes that add up to it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Aspect {
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub relative: bool,
    pub slices: BTreeMap<String, f64>,
}

impl Aspect {
    pub fn new(name: impl Into<String>, slices: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self { name: name.into(), relative: false, slices: slices.into_iter().collect() }
    }

    pub fn relative(mut self) -> Self {
        self.relative = true;
        self
    }

    pub fn slice_sum(&self) -> f64 {
        self.slices.values().sum()
    }

    /// Slice total, optionally leaving out the reserved "unknown" slice.
    pub fn slice_sum_known(&self) -> f64 {
        self.slices
            .iter()
            .filter(|(name, _)| name.as_str() != UNKNOWN_SLICE)
            .map(|(_, v)| *v)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NumberParam {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aspects: Vec<Aspect>,
}

impl NumberParam {
    pub fn new(value: f64) -> Self {
        Self { value, ..Default::default() }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_aspects(mut self, aspects: Vec<Aspect>) -> Self {
        self.aspects = aspects;
        self
    }

    pub fn has_aspect(&self) -> bool {
        !self.aspects.is_empty()
    }
}

/// Every value a port, variable or element can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Param {
    Number(NumberParam),
    String { value: String },
    Boolean { value: bool },
    Aspect { value: Aspect },
    Date { value: String },
    Random(RandomParam),
    ResponseNumber(ResponseParam),
}

impl Param {
    pub fn number(value: f64) -> Self {
        Param::Number(NumberParam::new(value))
    }

    pub fn boolean(value: bool) -> Self {
        Param::Boolean { value }
    }

    pub fn as_number(&self) -> Option<&NumberParam> {
        match self {
            Param::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Param::Number(_))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Param::Boolean { .. })
    }

    /// A number that carries at least one aspect.
    pub fn is_aspect_number(&self) -> bool {
        matches!(self, Param::Number(n) if n.has_aspect())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Param::Number(_) => "NUMBER",
            Param::String { .. } => "STRING",
            Param::Boolean { .. } => "BOOLEAN",
            Param::Aspect { .. } => "ASPECT",
            Param::Date { .. } => "DATE",
            Param::Random(_) => "RANDOM",
            Param::ResponseNumber(_) => "RESPONSE_NUMBER",
        }
    }
}

impl From<NumberParam> for Param {
    fn from(n: NumberParam) -> Self {
        Param::Number(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_wire_format() {
        let p: Param = serde_json::from_str(r#"{"type":"NUMBER","value":42,"unit":"tps"}"#).unwrap();
        assert_eq!(p, Param::Number(NumberParam::new(42.0).with_unit("tps")));
        let back = serde_json::to_string(&p).unwrap();
        assert_eq!(back, r#"{"type":"NUMBER","value":42.0,"unit":"tps"}"#);
    }

    #[test]
    fn test_aspect_param_wire_format() {
        let p: Param = serde_json::from_str(
            r#"{"type":"ASPECT","value":{"name":"os","slices":{"ios":1,"android":3}}}"#,
        )
        .unwrap();
        match p {
            Param::Aspect { value } => {
                assert_eq!(value.name, "os");
                assert!(!value.relative);
                assert_eq!(value.slice_sum(), 4.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_known_slice_sum_skips_unknown() {
        let a = Aspect::new("os", [("ios".to_string(), 2.0), (UNKNOWN_SLICE.to_string(), 5.0)]);
        assert_eq!(a.slice_sum(), 7.0);
        assert_eq!(a.slice_sum_known(), 2.0);
    }
}
