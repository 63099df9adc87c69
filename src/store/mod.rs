//! Simulation node records and the raw facts collected during a run.
pub mod registry;
pub mod types;

pub use registry::NodeStore;
pub use types::{
    MessageType, NodeFact, RawNodeDataEntry, RuntimeMessage, ScenarioReports, SimulationMessage, SimulationNode,
    StackFrame, StepCursor,
};
