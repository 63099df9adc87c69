//! result.rs
//! The document a run produces: terminal state, failure details, warnings
//! and the aggregated node tree.

use crate::config::simulation::{Scenario, SimulationConfiguration};
use crate::error::{ErrorCode, SimError, SimulationStage};
use crate::store::{RuntimeMessage, SimulationNode, StackFrame};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulationState {
    Queued,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub stage: SimulationStage,
    #[serde(default)]
    pub stack: Vec<StackFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    #[serde(default)]
    pub object_id: String,
    pub state: SimulationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
    #[serde(default)]
    pub warnings: Vec<RuntimeMessage>,
    pub step_start: String,
    pub step_last: String,
    pub queued_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ran_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub nodes: BTreeMap<String, SimulationNode>,
    #[serde(default)]
    pub scenarios: BTreeMap<String, Scenario>,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

impl SimulationResult {
    pub fn queued(config: &SimulationConfiguration) -> Self {
        Self {
            object_id: config.object_id.clone(),
            state: SimulationState::Queued,
            error: None,
            error_details: None,
            warnings: Vec::new(),
            step_start: config.step_start.clone(),
            step_last: config.step_last.clone(),
            queued_at: now(),
            ran_at: None,
            finished_at: None,
            nodes: BTreeMap::new(),
            scenarios: config.scenarios.clone(),
        }
    }

    pub fn start(&mut self) {
        self.state = SimulationState::Running;
        self.ran_at = Some(now());
    }

    pub fn finish(&mut self, nodes: BTreeMap<String, SimulationNode>, warnings: Vec<RuntimeMessage>) {
        self.state = SimulationState::Done;
        self.nodes = nodes;
        self.warnings = warnings;
        self.finished_at = Some(now());
    }

    /// Marks the run failed. The node that caused it is the innermost one on
    /// the stack snapshot.
    pub fn fail(&mut self, error: &SimError, stage: SimulationStage, stack: Vec<StackFrame>, warnings: Vec<RuntimeMessage>) {
        self.state = SimulationState::Failed;
        self.error = Some(error.to_string());
        self.error_details = Some(ErrorDetails {
            code: error.code(),
            stage,
            node_id: stack.last().map(|f| f.node_id.clone()),
            stack,
        });
        self.warnings = warnings;
        self.finished_at = Some(now());
    }

    pub fn is_done(&self) -> bool {
        self.state == SimulationState::Done
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SimulationConfiguration {
        SimulationConfiguration {
            object_id: "sc".into(),
            reference: "gm".into(),
            step_start: "2024-01".into(),
            step_last: "2024-03".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_lifecycle_timestamps() {
        let mut result = SimulationResult::queued(&config());
        assert_eq!(result.state, SimulationState::Queued);
        assert!(result.ran_at.is_none());
        result.start();
        assert_eq!(result.state, SimulationState::Running);
        result.finish(BTreeMap::new(), Vec::new());
        assert!(result.is_done());
        assert!(chrono::DateTime::parse_from_rfc3339(result.finished_at.as_deref().unwrap()).is_ok());
    }

    #[test]
    fn test_failure_points_at_innermost_frame() {
        let mut result = SimulationResult::queued(&config());
        let stack = vec![
            StackFrame { node_id: "root".into(), name: "Root".into() },
            StackFrame { node_id: "inner".into(), name: "Inner".into() },
        ];
        result.fail(&SimError::InitializationFailed, SimulationStage::Setup, stack, Vec::new());
        let details = result.error_details.as_ref().unwrap();
        assert_eq!(result.error.as_deref(), Some("graph model init failed"));
        assert_eq!(details.code, ErrorCode::ModelInitializationFailed);
        assert_eq!(details.node_id.as_deref(), Some("inner"));

        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["state"], "FAILED");
        assert_eq!(json["errorDetails"]["stage"], "SETUP");
        assert_eq!(json["stepLast"], "2024-03");
    }
}
