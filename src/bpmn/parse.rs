//! This module is responsible for parsing BPMN 2.0 XML files into a BPMN collaboration model.

use serde::{Deserialize, Deserializer};

use crate::bpmn::{BpmnModel, ElementType, Flow, FlowElement, Participant, TimerDefinition};

/// We just need the ID and optional name of each flow node
/// This macro generates structs with these fields
macro_rules! def_bpmn_struct {
    ($($name:ident),*) => {$(
        #[derive(Debug, Deserialize)]
        struct $name {
            #[serde(rename = "@id")]
            id: String,
            #[serde(rename = "@name")]
            name: Option<String>,
        }
    )*};
}

def_bpmn_struct!(
    StartEvent,
    EndEvent,
    Task,
    SendTask,
    ReceiveTask,
    UserTask,
    ServiceTask,
    ManualTask,
    BusinessRuleTask,
    ScriptTask,
    ExclusiveGateway,
    ParallelGateway
);

/// The text payload of a timeDuration child element
#[derive(Debug, Deserialize)]
struct TimeDuration {
    #[serde(rename = "$text")]
    text: String,
}

/// A timer definition nested in a catch event.
/// The id is optional in plain documents; modeling tools usually synthesize one.
#[derive(Debug, Deserialize)]
struct TimerEventDefinition {
    #[serde(rename = "@id")]
    id: Option<String>,
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "timeDuration")]
    time_duration: Option<TimeDuration>,
}

#[derive(Debug, Deserialize)]
struct IntermediateCatchEvent {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "timerEventDefinition")]
    timer_event_definition: Option<TimerEventDefinition>,
}

/// A sequence flow connects a source element to a target element within a process
#[derive(Debug, Deserialize)]
struct SequenceFlow {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "@sourceRef")]
    source_id: String,
    #[serde(rename = "@targetRef")]
    target_id: String,
}

/// A message flow connects elements (or pools) across processes
#[derive(Debug, Deserialize)]
struct MessageFlow {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "@sourceRef")]
    source_id: String,
    #[serde(rename = "@targetRef")]
    target_id: String,
}

/// A pool participant as declared in the collaboration
#[derive(Debug, Deserialize)]
struct ParticipantXml {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "@processRef")]
    process_ref: Option<String>,
}

/// The collaboration lists the pools and the message flows between them
#[derive(Debug, Deserialize)]
struct Collaboration {
    #[serde(rename = "participant", default)]
    participants: Vec<ParticipantXml>,
    #[serde(rename = "messageFlow", default)]
    message_flows: Vec<MessageFlow>,
}

/// A BPMN process consists of a unique ID and a list of start events, end events,
/// tasks, gateways, catch events, and sequence flows
#[derive(Debug, Deserialize)]
struct Process {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "startEvent", default)]
    start_events: Vec<StartEvent>,
    #[serde(rename = "endEvent", default)]
    end_events: Vec<EndEvent>,
    #[serde(rename = "task", default)]
    tasks: Vec<Task>,
    #[serde(rename = "sendTask", default)]
    send_tasks: Vec<SendTask>,
    #[serde(rename = "receiveTask", default)]
    receive_tasks: Vec<ReceiveTask>,
    #[serde(rename = "userTask", default)]
    user_tasks: Vec<UserTask>,
    #[serde(rename = "serviceTask", default)]
    service_tasks: Vec<ServiceTask>,
    #[serde(rename = "manualTask", default)]
    manual_tasks: Vec<ManualTask>,
    #[serde(rename = "businessRuleTask", default)]
    business_rule_tasks: Vec<BusinessRuleTask>,
    #[serde(rename = "scriptTask", default)]
    script_tasks: Vec<ScriptTask>,
    #[serde(rename = "exclusiveGateway", default)]
    exclusive_gateways: Vec<ExclusiveGateway>,
    #[serde(rename = "parallelGateway", default)]
    parallel_gateways: Vec<ParallelGateway>,
    #[serde(rename = "intermediateCatchEvent", default)]
    intermediate_catch_events: Vec<IntermediateCatchEvent>,
    #[serde(rename = "sequenceFlow", default)]
    sequence_flows: Vec<SequenceFlow>,
}

/// The root element of a BPMN 2.0 XML file.
/// This is the type we deserialize the XML file into, and then convert into a collaboration model.
#[derive(Debug, Deserialize)]
struct BpmnXml {
    #[serde(rename = "collaboration")]
    collaboration: Option<Collaboration>,
    #[serde(rename = "process", default)]
    processes: Vec<Process>,
}

/// Convert a deserialized BPMN XML file into a collaboration model
impl From<BpmnXml> for BpmnModel {
    fn from(file: BpmnXml) -> Self {
        let mut model = BpmnModel::default();

        if let Some(collaboration) = file.collaboration {
            for participant in collaboration.participants {
                model.participants.push(Participant {
                    name: participant.name.unwrap_or_else(|| participant.id.clone()),
                    id: participant.id,
                    process_id: participant.process_ref,
                });
            }
            for flow in collaboration.message_flows {
                model.message_flows.push(Flow {
                    id: flow.id,
                    name: flow.name,
                    source_id: flow.source_id,
                    target_id: flow.target_id,
                });
            }
        }

        macro_rules! collect {
            ($list:expr, $element_type:expr, $process_id:expr) => {
                for element in $list {
                    model.elements.push(FlowElement {
                        id: element.id,
                        name: element.name,
                        element_type: $element_type,
                        process_id: $process_id.clone(),
                    });
                }
            };
        }

        for process in file.processes {
            let process_id = process.id;
            collect!(process.start_events, ElementType::StartEvent, process_id);
            collect!(process.end_events, ElementType::EndEvent, process_id);
            collect!(process.tasks, ElementType::Task, process_id);
            collect!(process.send_tasks, ElementType::Task, process_id);
            collect!(process.receive_tasks, ElementType::Task, process_id);
            collect!(process.user_tasks, ElementType::Task, process_id);
            collect!(process.service_tasks, ElementType::Task, process_id);
            collect!(process.manual_tasks, ElementType::Task, process_id);
            collect!(process.business_rule_tasks, ElementType::Task, process_id);
            collect!(process.script_tasks, ElementType::Task, process_id);
            collect!(process.exclusive_gateways, ElementType::Gateway, process_id);
            collect!(process.parallel_gateways, ElementType::Gateway, process_id);

            // A catch event is an element in its own right; a nested timer
            // definition additionally becomes a timer node. The timer keeps its
            // own id when the document carries one and borrows the enclosing
            // event's id otherwise.
            for event in process.intermediate_catch_events {
                if let Some(definition) = event.timer_event_definition {
                    model.timers.push(TimerDefinition {
                        id: definition.id.unwrap_or_else(|| event.id.clone()),
                        name: definition.name,
                        duration: definition.time_duration.map(|duration| duration.text),
                        process_id: process_id.clone(),
                    });
                }
                model.elements.push(FlowElement {
                    id: event.id,
                    name: event.name,
                    element_type: ElementType::IntermediateCatchEvent,
                    process_id: process_id.clone(),
                });
            }

            for flow in process.sequence_flows {
                model.sequence_flows.push(Flow {
                    id: flow.id,
                    name: flow.name,
                    source_id: flow.source_id,
                    target_id: flow.target_id,
                });
            }
        }

        model
    }
}

/// To deserialize a collaboration model, we first deserialize the XML file into a
/// BpmnXml struct and then convert this struct into a BpmnModel
impl<'de> Deserialize<'de> for BpmnModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BpmnXml::deserialize(deserializer).map(Into::into)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TWO_POOL_DIAGRAM: &str = r#"
        <definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL">
          <collaboration id="Collaboration_1">
            <participant id="Participant_1" name="Customer" processRef="Process_1"/>
            <participant id="Participant_2" processRef="Process_2"/>
            <messageFlow id="MessageFlow_1" name="Order" sourceRef="Task_Order" targetRef="Task_Ship"/>
          </collaboration>
          <process id="Process_1">
            <startEvent id="Start_1" name="Order placed"/>
            <task id="Task_Order" name="Place order"/>
            <exclusiveGateway id="Gateway_1" name="Approved?"/>
            <intermediateCatchEvent id="Catch_1" name="Wait for delivery">
              <timerEventDefinition id="Timer_1">
                <timeDuration>P5D</timeDuration>
              </timerEventDefinition>
            </intermediateCatchEvent>
            <endEvent id="End_1" name="Done"/>
            <sequenceFlow id="Flow_1" sourceRef="Start_1" targetRef="Task_Order"/>
            <sequenceFlow id="Flow_2" sourceRef="Task_Order" targetRef="Gateway_1"/>
            <sequenceFlow id="Flow_3" name="Yes" sourceRef="Gateway_1" targetRef="Catch_1"/>
            <sequenceFlow id="Flow_4" name="No" sourceRef="Gateway_1" targetRef="End_1"/>
          </process>
          <process id="Process_2">
            <userTask id="Task_Ship" name="Ship goods"/>
          </process>
        </definitions>
    "#;

    #[test]
    fn parses_collaboration_with_two_pools() -> Result<(), Box<dyn std::error::Error>> {
        let model: BpmnModel = quick_xml::de::from_str(TWO_POOL_DIAGRAM)?;

        assert_eq!(model.participants.len(), 2);
        assert_eq!(model.participants[0].name, "Customer");
        assert_eq!(model.participants[0].process_id.as_deref(), Some("Process_1"));
        // A participant without a label falls back to its id
        assert_eq!(model.participants[1].name, "Participant_2");

        assert_eq!(model.elements_of(ElementType::StartEvent).count(), 1);
        assert_eq!(model.elements_of(ElementType::EndEvent).count(), 1);
        assert_eq!(model.elements_of(ElementType::Gateway).count(), 1);
        // The plain task and the user task are both tasks
        let tasks: Vec<_> = model.elements_of(ElementType::Task).collect();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "Task_Order");
        assert_eq!(tasks[0].process_id, "Process_1");
        assert_eq!(tasks[1].id, "Task_Ship");
        assert_eq!(tasks[1].process_id, "Process_2");

        assert_eq!(model.timers.len(), 1);
        assert_eq!(model.timers[0].id, "Timer_1");
        assert_eq!(model.timers[0].duration.as_deref(), Some("P5D"));
        assert_eq!(model.timers[0].process_id, "Process_1");

        assert_eq!(model.sequence_flows.len(), 4);
        assert_eq!(model.sequence_flows[2].name.as_deref(), Some("Yes"));
        assert_eq!(model.message_flows.len(), 1);
        assert_eq!(model.message_flows[0].source_id, "Task_Order");
        Ok(())
    }

    #[test]
    fn timer_without_own_id_borrows_the_event_id() -> Result<(), Box<dyn std::error::Error>> {
        let xml = r#"
            <definitions>
              <process id="Process_1">
                <startEvent id="Start_1"/>
                <intermediateCatchEvent id="Catch_1">
                  <timerEventDefinition>
                    <timeDuration>P2D</timeDuration>
                  </timerEventDefinition>
                </intermediateCatchEvent>
                <endEvent id="End_1"/>
              </process>
            </definitions>
        "#;
        let model: BpmnModel = quick_xml::de::from_str(xml)?;
        assert_eq!(model.timers.len(), 1);
        assert_eq!(model.timers[0].id, "Catch_1");
        assert!(model.has_element("Catch_1"));
        Ok(())
    }

    #[test]
    fn diagram_without_collaboration_still_parses() -> Result<(), Box<dyn std::error::Error>> {
        let xml = r#"
            <definitions>
              <process id="Process_1">
                <startEvent id="Start_1"/>
                <task id="Task_1" name="Do the work"/>
                <endEvent id="End_1"/>
                <sequenceFlow id="Flow_1" sourceRef="Start_1" targetRef="Task_1"/>
                <sequenceFlow id="Flow_2" sourceRef="Task_1" targetRef="End_1"/>
              </process>
            </definitions>
        "#;
        let model: BpmnModel = quick_xml::de::from_str(xml)?;
        assert!(model.participants.is_empty());
        assert_eq!(model.elements.len(), 3);
        assert_eq!(model.sequence_flows.len(), 2);
        Ok(())
    }
}
