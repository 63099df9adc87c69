//! message.rs
//! Warning and error elements: each pass records one named message, raised
//! whenever the trigger receives anything but `false`.

use crate::config::graph::{GeneratesResponse, InportDef, Process, ProcessInterfaceDescription};
use crate::elements::{ElementBehavior, PortSet};
use crate::error::Result;
use crate::graph::node::NodeIdentity;
use crate::param::Param;
use crate::simulation::environment::Environment;
use crate::store::{MessageType, SimulationMessage};

pub const WARNING_ID: &str = "warning";
pub const ERROR_ID: &str = "error";
pub const TRIGGER: &str = "trigger";

fn description(id: &str, name: &str) -> ProcessInterfaceDescription {
    ProcessInterfaceDescription::new(id, name).inport(InportDef::new(TRIGGER, "Trigger", GeneratesResponse::Never))
}

pub fn warning_description() -> ProcessInterfaceDescription {
    description(WARNING_ID, "Warning")
}

pub fn error_description() -> ProcessInterfaceDescription {
    description(ERROR_ID, "Error")
}

pub fn warning_factory(_: &Process) -> Box<dyn ElementBehavior> {
    Box::new(Message::new(MessageType::Warning))
}

pub fn error_factory(_: &Process) -> Box<dyn ElementBehavior> {
    Box::new(Message::new(MessageType::Error))
}

#[derive(Debug)]
pub struct Message {
    message_type: MessageType,
    triggered: bool,
}

impl Message {
    pub fn new(message_type: MessageType) -> Self {
        Self { message_type, triggered: false }
    }
}

impl ElementBehavior for Message {
    fn on_load(&mut self, _port: &str, load: &Param) {
        if !matches!(load, Param::Boolean { value: false }) {
            self.triggered = true;
        }
    }

    /// Records one message per pass; a blank one keeps the sample count
    /// honest when nothing fired.
    fn process(&mut self, _ports: &mut PortSet, node: &NodeIdentity, env: &mut Environment) -> Result<()> {
        let message = SimulationMessage {
            message_type: self.message_type,
            name: node.label.clone(),
            blank: !self.triggered,
        };
        env.store_raw_data(node, message.into());
        Ok(())
    }

    fn reset(&mut self) {
        self.triggered = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::testing::*;
    use crate::aggregation::report::{aggregate_step, Sample};
    use crate::aggregation::{Aggregate, AggregationMethod};
    use crate::store::NodeFact;
    use rstest::rstest;

    #[rstest]
    #[case(Some(Param::boolean(false)), true)]
    #[case(Some(Param::boolean(true)), false)]
    #[case(Some(Param::number(0.0)), false)]
    #[case(None, true)]
    fn test_trigger(#[case] load: Option<Param>, #[case] blank: bool) {
        let mut env = env();
        let mut process = process(WARNING_ID, None, 0);
        process.label = Some("Disk almost full".into());
        let mut node = build(&process, &mut env);
        let loads: Vec<(&str, Param)> = load.into_iter().map(|l| (TRIGGER, l)).collect();
        run(node.as_mut(), &mut env, &loads, None);

        let stored = &env.store().get(&node.identity().simulation_id).unwrap().raw_data;
        assert_eq!(stored.len(), 1);
        match &stored[0].data {
            NodeFact::Message(m) => {
                assert_eq!(m.name, "Disk almost full");
                assert_eq!(m.blank, blank);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reset_clears_trigger() {
        let mut env = env();
        let mut node = build(&process(WARNING_ID, None, 0), &mut env);
        run(node.as_mut(), &mut env, &[(TRIGGER, Param::boolean(true))], None);
        run(node.as_mut(), &mut env, &[], None);
        let stored = &env.store().get(&node.identity().simulation_id).unwrap().raw_data;
        let blanks: Vec<bool> = stored
            .iter()
            .map(|e| matches!(&e.data, NodeFact::Message(m) if m.blank))
            .collect();
        assert_eq!(blanks, vec![false, true]);
    }

    #[test]
    fn test_error_element_records_error_rate() {
        let mut env = env();
        let mut process = process(ERROR_ID, None, 0);
        process.label = Some("Quota exceeded".into());
        let mut node = build(&process, &mut env);
        // mean pass fires, then one of two trials
        run(node.as_mut(), &mut env, &[(TRIGGER, Param::boolean(true))], None);
        run(node.as_mut(), &mut env, &[(TRIGGER, Param::number(3.0))], Some(0));
        run(node.as_mut(), &mut env, &[(TRIGGER, Param::boolean(false))], Some(1));

        let stored = &env.store().get(&node.identity().simulation_id).unwrap().raw_data;
        let samples: Vec<Sample> = stored.iter().map(|e| Sample::from(&e.data)).collect();
        match &aggregate_step(&samples)[&AggregationMethod::Messages] {
            Aggregate::Messages { values } => {
                assert_eq!(values.len(), 1);
                assert_eq!(values[0].message_type, MessageType::Error);
                assert_eq!(values[0].name, "Quota exceeded");
                assert_eq!(values[0].rate, 50);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
