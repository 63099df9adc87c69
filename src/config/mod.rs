//! Input documents: graph models, element interfaces and simulation configurations.
pub mod graph;
pub mod simulation;

pub use graph::{
    reference_tracking_version, Connection, GeneratesResponse, GraphModelDef, InportDef, OutportDef, Process,
    ProcessInterfaceDescription, ProcessPort, ProcessPortTemplate, ProcessType, Tracking, VariableDef, VariableKind,
    VersionedDependency,
};
pub use simulation::{
    gen_months, ForecastRefTag, ForecastVariableRef, InportBinding, RunOptions, Scenario, SheetRef, SimulationConfiguration,
};
