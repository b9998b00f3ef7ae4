pub mod error;
pub mod bpmn;
pub mod contract;
pub mod analysis;

pub use quick_xml::de::from_reader as parse_xml;

pub use error::*;
pub use crate::bpmn::BpmnModel;
pub use crate::contract::Contract;
