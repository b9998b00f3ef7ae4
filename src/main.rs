use std::fs::File;
use std::io::{self, BufReader, Write};

use log::warn;

use bpmn_solidity::{analysis, parse_xml, BpmnModel, Contract, Error};

/// Print a prompt and read one trimmed line from stdin
fn prompt(message: &str) -> Result<String, Error> {
    print!("{}", message);
    io::stdout().flush().map_err(Error::IO)?;
    let mut line = String::new();
    io::stdin().read_line(&mut line).map_err(Error::IO)?;
    Ok(line.trim().to_string())
}

/// Write the contract source, removing the partial file if the write fails
fn write_contract(file_name: &str, source: &str) -> Result<(), Error> {
    if let Err(e) = std::fs::write(file_name, source) {
        let _ = std::fs::remove_file(file_name);
        return Err(Error::IO(e));
    }
    Ok(())
}

fn main() -> Result<(), Error> {
    env_logger::init();

    let file_path = prompt("Enter the BPMN file path: ")?;
    if file_path.is_empty() {
        return Err(Error::NoInputFile);
    }

    // Load the BPMN collaboration model
    let file = File::open(&file_path).map(BufReader::new).map_err(Error::IO)?;
    let model: BpmnModel = parse_xml(file).map_err(Error::Parse)?;

    let contract_name = prompt("Enter the smart contract name: ")?;

    // Ask for an Ethereum address for each pool, in document order
    let mut addresses = Vec::with_capacity(model.participants.len());
    for participant in &model.participants {
        let address = prompt(&format!("Enter Ethereum address for '{}': ", participant.name))?;
        addresses.push((participant.name.clone(), address));
    }

    let contract = Contract::new(&model, &contract_name, addresses)?;
    let source = contract.to_string();
    if source.matches("SPDX-License-Identifier").count() > 1 {
        warn!("multiple SPDX identifiers found in the generated contract");
    }

    let file_name = format!("{}.sol", contract_name);
    write_contract(&file_name, &source)?;
    println!("Smart contract generated: {}", file_name);

    // The analysis never blocks a successful compilation
    if let Err(e) = analysis::run(&file_name) {
        warn!("security analysis failed: {}", e);
    }

    println!("Contract successfully generated: {}", file_name);
    Ok(())
}
