// FFI Facade: the entry point for Python.
// Models, forecast sheets and configurations cross the boundary as JSON
// documents; results come back as the JSON of the simulation result.

use crate::config::graph::GraphModelDef;
use crate::config::simulation::{RunOptions, SimulationConfiguration};
use crate::param::Param;
use crate::simulation::{InMemoryModels, InMemorySheets, SheetProjection, SimulationHarness};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::collections::BTreeMap;

fn invalid(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

#[pyclass(name = "_Simulator")]
#[derive(Debug, Clone, Default)]
pub struct PySimulator {
    models: InMemoryModels,
    sheets: InMemorySheets,
}

#[pymethods]
impl PySimulator {
    #[new]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a graph model document under `version` (`latest` or `rN`).
    pub fn add_model(&mut self, model_json: &str, version: &str) -> PyResult<()> {
        let def: GraphModelDef = serde_json::from_str(model_json).map_err(invalid)?;
        self.models.insert(version, def);
        Ok(())
    }

    /// Registers a forecast sheet given as `{variable: {"YYYY-MM": param}}`.
    pub fn add_sheet(&mut self, sheet_id: &str, version: &str, values_json: &str) -> PyResult<()> {
        let values: BTreeMap<String, BTreeMap<String, Param>> = serde_json::from_str(values_json).map_err(invalid)?;
        let mut projection = SheetProjection::new();
        for (variable, months) in values {
            for (date, value) in months {
                projection.insert(variable.clone(), date, value);
            }
        }
        self.sheets.insert(sheet_id, version, projection);
        Ok(())
    }

    pub fn trash_model(&mut self, model_id: &str) {
        self.models.trash(model_id);
    }

    pub fn trash_sheet(&mut self, sheet_id: &str) {
        self.sheets.trash(sheet_id);
    }

    /// Runs a configuration and returns the result document. Simulation
    /// failures are part of the result; only malformed input raises.
    #[pyo3(signature = (config_json, seed = 0, parallel = true, inhibit_aggregation = false))]
    pub fn run(&self, py: Python<'_>, config_json: &str, seed: u64, parallel: bool, inhibit_aggregation: bool) -> PyResult<String> {
        let config = SimulationConfiguration::from_json(config_json).map_err(invalid)?;
        let options = RunOptions { seed, parallel, inhibit_aggregation };
        let result = py.detach(|| {
            SimulationHarness::new(&self.models, &self.sheets).with_options(options).run(&config)
        });
        result.to_json().map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }
}

/// One-shot run: `models_json` maps a version (`latest`, `rN`) to the model
/// documents published under it.
#[pyfunction]
#[pyo3(signature = (config_json, models_json, seed = 0))]
fn run_simulation(py: Python<'_>, config_json: &str, models_json: &str, seed: u64) -> PyResult<String> {
    let published: BTreeMap<String, Vec<GraphModelDef>> = serde_json::from_str(models_json).map_err(invalid)?;
    let mut simulator = PySimulator::new();
    for (version, defs) in published {
        for def in defs {
            simulator.models.insert(version.clone(), def);
        }
    }
    simulator.run(py, config_json, seed, true, false)
}

/// Confirms the Rust core is callable from Python.
#[pyfunction]
fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PySimulator>()?;
    m.add_function(wrap_pyfunction!(run_simulation, m)?)?;
    m.add_function(wrap_pyfunction!(version, m)?)?;
    Ok(())
}
