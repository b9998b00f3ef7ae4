//! This module renders a derived contract as Solidity source code.
//!
//! Rendering is a pure function of the contract: all lists are walked in
//! document order, so compiling the same diagram twice produces
//! byte-identical output.

use std::fmt::{Display, Formatter, Result as FmtResult};

use super::{Contract, Operation, Successor, Timer, UNKNOWN_PARTICIPANT};

/// Fixed preamble: license marker, language pragma, OpenZeppelin imports, docblock
const HEADER: &str = "\
// SPDX-License-Identifier: MIT
pragma solidity ^0.8.20;

import \"@openzeppelin/contracts/utils/ReentrancyGuard.sol\";
import \"@openzeppelin/contracts/access/Ownable.sol\";
import \"@openzeppelin/contracts/utils/Pausable.sol\";

/**
 * @title Smart Contract automatically generated from a BPMN diagram
 * @dev Timer events handled using block numbers.
 */
";

impl Display for Contract {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(HEADER)?;
        writeln!(f, "contract {} is ReentrancyGuard, Ownable, Pausable {{", self.name)?;
        writeln!(f)?;
        writeln!(f, "    enum State {{ DISABLED, ENABLED, DONE }}")?;
        writeln!(f)?;
        writeln!(f, "    mapping(string => State) public elementStates;")?;
        writeln!(f, "    mapping(string => uint256) public blockLimits;")?;
        writeln!(f, "    mapping(string => address) public participantAddresses;")?;
        writeln!(f)?;
        writeln!(f, "    struct AuditLog {{")?;
        writeln!(f, "        string taskId;")?;
        writeln!(f, "        address user;")?;
        writeln!(f, "        uint256 timestamp;")?;
        writeln!(f, "    }}")?;
        writeln!(f)?;
        writeln!(f, "    AuditLog[] public auditLogs;")?;
        writeln!(f)?;
        writeln!(f, "    event TaskCompleted(string taskId);")?;
        writeln!(f, "    event TimerScheduled(string timerId, uint256 deadlineBlock);")?;
        writeln!(f)?;
        writeln!(f, "    struct GatewayData {{")?;
        writeln!(f, "        string participantName;")?;
        writeln!(f, "        string[] dependencies;")?;
        writeln!(f, "        string yesTargetId;")?;
        writeln!(f, "        string noTargetId;")?;
        writeln!(f, "    }}")?;
        writeln!(f)?;
        writeln!(f, "    mapping(string => GatewayData) public gatewayMap;")?;
        writeln!(f)?;

        self.write_constructor(f)?;
        self.write_admin_operations(f)?;

        writeln!(f, "    function logAudit(string memory taskId) private {{")?;
        writeln!(f, "        auditLogs.push(AuditLog({{taskId: taskId, user: msg.sender, timestamp: block.timestamp}}));")?;
        writeln!(f, "    }}")?;
        writeln!(f)?;

        self.write_start_event(f)?;
        for task in &self.tasks {
            write_operation(f, task, "Task not enabled", "can do this task")?;
        }
        for event in &self.events {
            write_operation(f, event, "Event not enabled", "can trigger this event")?;
        }
        for timer in &self.timers {
            write_timer(f, timer)?;
        }
        self.write_gateway_dispatch(f)?;

        writeln!(f, "}}")
    }
}

impl Contract {
    fn write_constructor(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "    constructor() Ownable(msg.sender) Pausable() {{")?;
        for (participant, address) in &self.participants {
            writeln!(f, "        participantAddresses[\"{}\"] = {};", participant, address)?;
        }
        writeln!(f)?;
        writeln!(f, "        elementStates[\"{}\"] = State.ENABLED;", self.start.id)?;
        writeln!(f)?;
        for task in &self.tasks {
            writeln!(f, "        elementStates[\"{}\"] = State.DISABLED;", task.element_id)?;
        }
        for gateway in &self.gateways {
            writeln!(f, "        elementStates[\"{}\"] = State.DISABLED;", gateway.id)?;
        }
        for event in &self.events {
            writeln!(f, "        elementStates[\"{}\"] = State.DISABLED;", event.element_id)?;
        }
        for end_event_id in &self.end_event_ids {
            writeln!(f, "        elementStates[\"{}\"] = State.DISABLED;", end_event_id)?;
        }

        if !self.timers.is_empty() {
            writeln!(f)?;
            writeln!(f, "        // All timers start counting from the deployment block")?;
            for timer in &self.timers {
                writeln!(f, "        blockLimits[\"{}\"] = block.number + {};", timer.id, timer.blocks)?;
                writeln!(f, "        elementStates[\"{}\"] = State.ENABLED;", timer.id)?;
                writeln!(f, "        emit TimerScheduled(\"{}\", block.number + {});", timer.id, timer.blocks)?;
            }
        }

        for gateway in &self.gateways {
            writeln!(f)?;
            writeln!(f, "        {{")?;
            writeln!(f, "            string[] memory depArr = new string[]({});", gateway.dependencies.len())?;
            for (i, dependency) in gateway.dependencies.iter().enumerate() {
                writeln!(f, "            depArr[{}] = \"{}\";", i, dependency)?;
            }
            writeln!(f, "            gatewayMap[\"{}\"] = GatewayData({{", gateway.id)?;
            writeln!(f, "                participantName: \"{}\",", gateway.participant)?;
            writeln!(f, "                dependencies: depArr,")?;
            writeln!(f, "                yesTargetId: \"{}\",", gateway.yes_target_id)?;
            writeln!(f, "                noTargetId: \"{}\"", gateway.no_target_id)?;
            writeln!(f, "            }});")?;
            writeln!(f, "        }}")?;
        }

        writeln!(f, "    }}")?;
        writeln!(f)
    }

    fn write_admin_operations(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "    function updateParticipantAddress(string memory participant, address newAddress) public onlyOwner {{")?;
        writeln!(f, "        require(newAddress != address(0), \"Invalid address\");")?;
        writeln!(f, "        participantAddresses[participant] = newAddress;")?;
        writeln!(f, "    }}")?;
        writeln!(f)?;
        writeln!(f, "    function pause() public onlyOwner {{")?;
        writeln!(f, "        _pause();")?;
        writeln!(f, "    }}")?;
        writeln!(f)?;
        writeln!(f, "    function unpause() public onlyOwner {{")?;
        writeln!(f, "        _unpause();")?;
        writeln!(f, "    }}")?;
        writeln!(f)?;
        // The owner is the only caller that can re-arm a DONE element
        writeln!(f, "    function resetElementState(string memory elementId) public onlyOwner {{")?;
        writeln!(f, "        elementStates[elementId] = State.DISABLED;")?;
        writeln!(f, "    }}")?;
        writeln!(f)
    }

    fn write_start_event(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "    function startEvent() public nonReentrant whenNotPaused {{")?;
        writeln!(f, "        require(elementStates[\"{}\"] == State.ENABLED, \"StartEvent not enabled\");", self.start.id)?;
        if self.start.participant == UNKNOWN_PARTICIPANT {
            writeln!(f, "        // Start event open to any caller")?;
        } else {
            writeln!(
                f,
                "        require(msg.sender == participantAddresses[\"{}\"], \"Only {} can do this task\");",
                self.start.participant, self.start.participant
            )?;
        }
        writeln!(f)?;
        writeln!(f, "        elementStates[\"{}\"] = State.DONE;", self.start.id)?;
        writeln!(f, "        logAudit(\"{}\");", self.start.id)?;
        writeln!(f, "        emit TaskCompleted(\"{}\");", self.start.id)?;
        write_arming(f, &self.start.successors)?;
        writeln!(f, "    }}")?;
        writeln!(f)
    }

    fn write_gateway_dispatch(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "    function gatewayAction(string memory gatewayId, bool condition) public nonReentrant whenNotPaused {{")?;
        writeln!(f, "        GatewayData memory gdata = gatewayMap[gatewayId];")?;
        writeln!(f)?;
        writeln!(f, "        require(elementStates[gatewayId] == State.ENABLED, \"Gateway not enabled\");")?;
        writeln!(f, "        require(msg.sender == participantAddresses[gdata.participantName], \"Only correct participant can call\");")?;
        writeln!(f)?;
        writeln!(f, "        // Dependencies must be DONE")?;
        writeln!(f, "        for (uint i = 0; i < gdata.dependencies.length; i++) {{")?;
        writeln!(f, "            require(elementStates[gdata.dependencies[i]] == State.DONE, \"Dependency not completed\");")?;
        writeln!(f, "        }}")?;
        writeln!(f)?;
        writeln!(f, "        elementStates[gatewayId] = State.DONE;")?;
        writeln!(f, "        logAudit(gatewayId);")?;
        writeln!(f, "        emit TaskCompleted(gatewayId);")?;
        writeln!(f)?;
        writeln!(f, "        if (condition) {{")?;
        writeln!(f, "            if (bytes(gdata.yesTargetId).length > 0) {{")?;
        writeln!(f, "                elementStates[gdata.yesTargetId] = State.ENABLED;")?;
        writeln!(f, "            }}")?;
        writeln!(f, "        }} else {{")?;
        writeln!(f, "            if (bytes(gdata.noTargetId).length > 0) {{")?;
        writeln!(f, "                elementStates[gdata.noTargetId] = State.ENABLED;")?;
        writeln!(f, "            }}")?;
        writeln!(f, "        }}")?;
        writeln!(f, "    }}")?;
        writeln!(f)
    }
}

/// Shared body for task and catch event operations: enablement guard, caller
/// guard, dependency guard, transition, audit, successor arming
fn write_operation(
    f: &mut Formatter<'_>,
    op: &Operation,
    not_enabled: &str,
    caller_verb: &str,
) -> FmtResult {
    writeln!(f, "    function {}() public nonReentrant whenNotPaused {{", op.function_name)?;
    writeln!(
        f,
        "        require(elementStates[\"{}\"] == State.ENABLED, \"{}\");",
        op.element_id, not_enabled
    )?;
    writeln!(
        f,
        "        require(msg.sender == participantAddresses[\"{}\"], \"Only {} {}\");",
        op.participant, op.participant, caller_verb
    )?;

    match op.dependencies.as_slice() {
        [] => {}
        [dependency] => {
            writeln!(f)?;
            writeln!(
                f,
                "        require(elementStates[\"{}\"] == State.DONE, \"Dependency not completed\");",
                dependency
            )?;
        }
        // Several incoming flows merge disjunctively: one completed
        // predecessor is enough. AND-joins must be modeled as gateways.
        dependencies => {
            writeln!(f)?;
            writeln!(f, "        require(")?;
            for (i, dependency) in dependencies.iter().enumerate() {
                let separator = if i + 1 < dependencies.len() { " ||" } else { "," };
                writeln!(f, "            elementStates[\"{}\"] == State.DONE{}", dependency, separator)?;
            }
            writeln!(f, "            \"At least one dependency must be completed\"")?;
            writeln!(f, "        );")?;
        }
    }

    writeln!(f)?;
    writeln!(f, "        elementStates[\"{}\"] = State.DONE;", op.element_id)?;
    writeln!(f, "        logAudit(\"{}\");", op.element_id)?;
    writeln!(f, "        emit TaskCompleted(\"{}\");", op.element_id)?;
    write_arming(f, &op.successors)?;
    writeln!(f, "    }}")?;
    writeln!(f)
}

/// Timers carry no caller guard: once the deadline block has passed,
/// anyone may record the fact on chain
fn write_timer(f: &mut Formatter<'_>, timer: &Timer) -> FmtResult {
    writeln!(f, "    function {}() public nonReentrant whenNotPaused {{", timer.function_name)?;
    writeln!(
        f,
        "        require(elementStates[\"{}\"] == State.ENABLED, \"Timer event not enabled\");",
        timer.id
    )?;
    writeln!(
        f,
        "        require(block.number >= blockLimits[\"{}\"], \"Timer not expired yet\");",
        timer.id
    )?;
    writeln!(f)?;
    writeln!(f, "        elementStates[\"{}\"] = State.DONE;", timer.id)?;
    writeln!(f, "        logAudit(\"{}\");", timer.id)?;
    writeln!(f, "        emit TaskCompleted(\"{}\");", timer.id)?;
    write_arming(f, &timer.successors)?;
    writeln!(f, "    }}")?;
    writeln!(f)
}

/// Enable every outgoing edge target; timer targets also get their deadline
/// block recorded and announced
fn write_arming(f: &mut Formatter<'_>, successors: &[Successor]) -> FmtResult {
    if successors.is_empty() {
        return Ok(());
    }
    writeln!(f)?;
    for successor in successors {
        match successor.timer_blocks {
            Some(blocks) => {
                writeln!(f, "        blockLimits[\"{}\"] = block.number + {};", successor.target_id, blocks)?;
                writeln!(f, "        elementStates[\"{}\"] = State.ENABLED;", successor.target_id)?;
                writeln!(f, "        emit TimerScheduled(\"{}\", block.number + {});", successor.target_id, blocks)?;
            }
            None => {
                writeln!(f, "        elementStates[\"{}\"] = State.ENABLED;", successor.target_id)?;
            }
        }
    }
    Ok(())
}
