//! This module defines the data structures for BPMN collaboration diagrams
//! and provides a parser for BPMN 2.0 XML files.

mod parse;

/// Supported BPMN flow element types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    StartEvent,
    EndEvent,
    Task,
    Gateway,
    IntermediateCatchEvent,
}

/// A pool participant maps to a single on-chain address.
/// The display name falls back to the id when the diagram has no label.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: String,
    pub name: String,
    /// The process owned by this pool, if the diagram links one
    pub process_id: Option<String>,
}

/// A flow element has a unique ID, an optional name, a type,
/// and the ID of the process that contains it
#[derive(Debug, Clone)]
pub struct FlowElement {
    pub id: String,
    pub name: Option<String>,
    pub element_type: ElementType,
    pub process_id: String,
}

/// A directed edge between two elements.
/// Sequence flows stay within a process, message flows cross pools.
#[derive(Debug, Clone)]
pub struct Flow {
    pub id: String,
    /// The label on the edge ("Yes"/"No" on gateway branches)
    pub name: Option<String>,
    pub source_id: String,
    pub target_id: String,
}

/// A timer event definition nested inside an intermediate catch event.
/// The duration payload is the raw ISO-8601 text from the diagram, e.g. "P5D".
#[derive(Debug, Clone)]
pub struct TimerDefinition {
    pub id: String,
    pub name: Option<String>,
    pub duration: Option<String>,
    pub process_id: String,
}

/// A BPMN collaboration: pools, flow elements, timers, and the edges between them.
/// All lists preserve document order.
#[derive(Debug, Clone, Default)]
pub struct BpmnModel {
    pub participants: Vec<Participant>,
    pub elements: Vec<FlowElement>,
    pub timers: Vec<TimerDefinition>,
    pub sequence_flows: Vec<Flow>,
    pub message_flows: Vec<Flow>,
}

impl BpmnModel {
    /// Iterate the flow elements of one type in document order
    pub fn elements_of(&self, element_type: ElementType) -> impl Iterator<Item = &FlowElement> {
        self.elements
            .iter()
            .filter(move |element| element.element_type == element_type)
    }

    /// Whether an ID names a flow element or a timer in this model.
    /// Message flows may also reference pools, which are neither.
    pub fn has_element(&self, id: &str) -> bool {
        self.elements.iter().any(|element| element.id == id)
            || self.timers.iter().any(|timer| timer.id == id)
    }
}
