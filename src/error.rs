//! Crate-wide error type and the stable codes reported in simulation results.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

/// Stable, machine-readable failure codes carried by `errorDetails.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ModelInitializationFailed,
    GraphModelMissing,
    GraphModelTrashed,
    ForecastSheetMissing,
    ForecastSheetTrashed,
    InvalidConfiguration,
    Exception,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ModelInitializationFailed => "MODEL_INITIALIZATION_FAILED",
            ErrorCode::GraphModelMissing => "GRAPH_MODEL_MISSING",
            ErrorCode::GraphModelTrashed => "GRAPH_MODEL_TRASHED",
            ErrorCode::ForecastSheetMissing => "FORECAST_SHEET_MISSING",
            ErrorCode::ForecastSheetTrashed => "FORECAST_SHEET_TRASHED",
            ErrorCode::InvalidConfiguration => "INVALID_CONFIGURATION",
            ErrorCode::Exception => "EXCEPTION",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The phase of a run a failure or warning belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulationStage {
    Setup,
    Simulation,
    Aggregation,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("can only {op} numbers")]
    NotANumber { op: &'static str },
    #[error("{op} needs at least one input")]
    EmptyInput { op: &'static str },
    #[error("invalid {family} distribution: {detail}")]
    InvalidDistribution { family: &'static str, detail: String },
    #[error("graph model '{model}' failed to {stage}: {detail}")]
    Topology { model: String, stage: &'static str, detail: String },
    #[error("cycle detected in graph model '{model}' between {nodes:?}")]
    CycleDetected { model: String, nodes: Vec<String> },
    #[error("graph model init failed")]
    InitializationFailed,
    #[error("{message}")]
    Resource { code: ErrorCode, message: String },
    #[error("unknown process type for '{0}'")]
    UnknownProcessType(String),
    #[error("no processing element registered as '{0}'")]
    UnknownElement(String),
    #[error("no graph model '{id}' at version '{version}'")]
    UnknownModel { id: String, version: String },
    #[error("could not find variable value for {variable}:{date}")]
    ForecastValue { variable: String, date: String },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl SimError {
    /// Maps the error onto the code recorded in a failed result.
    pub fn code(&self) -> ErrorCode {
        match self {
            SimError::InitializationFailed
            | SimError::Topology { .. }
            | SimError::CycleDetected { .. } => ErrorCode::ModelInitializationFailed,
            SimError::Resource { code, .. } => *code,
            SimError::InvalidConfiguration(_) => ErrorCode::InvalidConfiguration,
            _ => ErrorCode::Exception,
        }
    }
}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        SimError::Serialization(e.to_string())
    }
}
