//! Simulation configurations, scenarios and run options.

use crate::config::graph::{reference_tracking_version, Tracking, VersionedDependency};
use crate::error::{Result, SimError};
use crate::param::Param;
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForecastRefTag {
    #[serde(rename = "FORECAST_VAR_REF")]
    ForecastVarRef,
}

/// Points an inport at a forecast-sheet variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastVariableRef {
    #[serde(rename = "type")]
    pub tag: ForecastRefTag,
    #[serde(default)]
    pub name: String,
    pub variable_id: String,
    pub sheet_ref_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// What a scenario feeds into one root inport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InportBinding {
    Forecast(ForecastVariableRef),
    Literal(Param),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub object_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    #[serde(default)]
    pub inports: BTreeMap<String, InportBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRef {
    #[serde(default)]
    pub object_id: String,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_nr: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<Tracking>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SheetRef {
    pub fn version(&self) -> String {
        reference_tracking_version(self.tracking, self.release_nr)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfiguration {
    #[serde(default)]
    pub object_id: String,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_nr: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<Tracking>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monte_carlo_iterations: Option<u32>,
    #[serde(default)]
    pub forecasts: BTreeMap<String, SheetRef>,
    pub step_start: String,
    pub step_last: String,
    #[serde(default)]
    pub scenarios: BTreeMap<String, Scenario>,
}

impl SimulationConfiguration {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SimError::InvalidConfiguration(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Version of the root model this configuration pins.
    pub fn model_version(&self) -> String {
        reference_tracking_version(self.tracking, self.release_nr)
    }

    pub fn monte_carlo_trials(&self) -> u32 {
        self.monte_carlo_iterations.unwrap_or(0)
    }

    /// Calendar months covered by the run, inclusive.
    pub fn months(&self) -> Result<Vec<String>> {
        gen_months(&self.step_start, &self.step_last)
    }

    /// Enabled scenarios in id order.
    pub fn active_scenarios(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.values().filter(|s| !s.disabled)
    }

    pub fn sheet_ref(&self, sheet_ref_id: &str) -> Result<&SheetRef> {
        self.forecasts
            .get(sheet_ref_id)
            .ok_or_else(|| SimError::InvalidConfiguration(format!("unknown forecast sheet reference '{}'", sheet_ref_id)))
    }

    /// Forecast sheets a scenario reads from, one entry per (sheet, version).
    pub fn needed_sheet_deps(&self, scenario: &Scenario) -> Result<Vec<VersionedDependency>> {
        let mut deps: Vec<VersionedDependency> = Vec::new();
        for binding in scenario.inports.values() {
            if let InportBinding::Forecast(var_ref) = binding {
                let sheet = self.sheet_ref(&var_ref.sheet_ref_id)?;
                let version = sheet.version();
                if !deps.iter().any(|d| d.id == sheet.reference && d.version == version) {
                    deps.push(VersionedDependency {
                        id: sheet.reference.clone(),
                        version,
                        name: sheet.label.clone().unwrap_or_default(),
                    });
                }
            }
        }
        Ok(deps)
    }
}

fn parse_month(step: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", step), "%Y-%m-%d")
        .map_err(|_| SimError::InvalidConfiguration(format!("'{}' is not a YYYY-MM month", step)))
}

/// Every month from `start` to `last` inclusive as `YYYY-MM`.
/// A `last` before `start` yields no months.
pub fn gen_months(start: &str, last: &str) -> Result<Vec<String>> {
    let mut current = parse_month(start)?;
    let last = parse_month(last)?;
    let mut months = Vec::new();
    while current <= last {
        months.push(current.format("%Y-%m").to_string());
        current = match current.checked_add_months(Months::new(1)) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(months)
}

/// Knobs of a run that are not part of the configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Seed of every random stream in the run.
    pub seed: u64,
    /// Run scenarios on the rayon pool.
    pub parallel: bool,
    /// Keep raw facts and skip the statistical reduction.
    pub inhibit_aggregation: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { seed: 0, parallel: true, inhibit_aggregation: false }
    }
}
