//! Capacity simulation core.
//!
//! Graph models of processing elements are evaluated month by month for every
//! scenario of a simulation configuration. Loads flow forward through the
//! graph, responses flow back, and Monte Carlo trials turn random inputs into
//! distributions that are aggregated per node once the run is over.

pub mod aggregation;
pub mod config;
pub mod elements;
pub mod error;
pub mod graph;
pub mod param;
pub mod response;
pub mod simulation;
pub mod store;

#[cfg(feature = "python")]
mod bindings;

pub use config::{RunOptions, SimulationConfiguration};
pub use error::{ErrorCode, Result, SimError};
pub use simulation::{SimulationHarness, SimulationResult};

// --- Module Definition ---
/// Defines the `capsim._core` Python module.
#[cfg(feature = "python")]
#[pyo3::pymodule]
fn _core(m: &pyo3::Bound<'_, pyo3::types::PyModule>) -> pyo3::PyResult<()> {
    bindings::python::register(m)
}
