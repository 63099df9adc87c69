//! Running configurations: the per-run environment, model and sheet
//! resolution, the scenario/month/trial driver and the result document.
pub mod environment;
pub mod harness;
pub mod resolver;
pub mod result;

pub use environment::Environment;
pub use harness::{generate_root_process, monte_carlo_sample, SimulationHarness};
pub use resolver::{
    FetchError, ForecastResolver, GraphModelLibrary, InMemoryModels, InMemorySheets, ModelResolver, NoForecasts,
    SheetProjection,
};
pub use result::{ErrorDetails, SimulationResult, SimulationState};
