//! This module defines the error type for this program.

use std::fmt::{Debug, Display, Formatter};

pub enum Error {
    NoInputFile, // Error when no BPMN file path is provided
    InvalidContractName(String), // Error when the contract name is not a valid Solidity identifier
    InvalidAddress(String, String), // Error when a participant's Ethereum address is malformed (participant, address)
    InvalidModel(String), // Error when the BPMN model cannot be compiled (e.g. missing start or end event)
    NameCollision(String, String), // Error when two elements sanitize to the same Solidity function name
    IO(std::io::Error), // Error when an IO operation fails
    Parse(quick_xml::de::DeError), // Error when parsing XML fails
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NoInputFile => write!(f, "No BPMN file provided. Exiting..."),
            Error::InvalidContractName(name) => write!(f, "Invalid contract name '{}'. Must start with a letter or underscore and contain only letters, numbers, or underscores.", name),
            Error::InvalidAddress(participant, address) => write!(f, "Invalid Ethereum address for participant '{}': {}", participant, address),
            Error::InvalidModel(reason) => write!(f, "Invalid BPMN model: {}", reason),
            Error::NameCollision(a, b) => write!(f, "Elements '{}' and '{}' produce the same Solidity function name", a, b),
            Error::IO(e) => write!(f, "Error during file IO: {}", e),
            Error::Parse(e) => write!(f, "Error parsing XML: {}", e),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl std::error::Error for Error {}
