//! This module derives an emission-ready Solidity contract from a BPMN
//! collaboration model and the user-supplied inputs.
//!
//! The derivation resolves three indices over the model (process ownership,
//! element dependencies, gateway branch targets), interprets timer durations
//! as block counts, sanitizes element names into Solidity identifiers, and
//! rejects anything that would produce uncompilable output. Rendering the
//! derived contract is the job of the `solidity` submodule.

mod solidity;

use std::collections::HashMap;

use log::warn;
use regex::Regex;

use crate::bpmn::{BpmnModel, ElementType, FlowElement, TimerDefinition};
use crate::error::Error;

/// Estimated number of blocks mined per day, assuming one block every 12 seconds
pub const BLOCKS_PER_DAY: u64 = 7200;

/// Fallback duration for timers with a missing or unsupported payload: 30 days
pub const DEFAULT_TIMER_BLOCKS: u64 = 30 * BLOCKS_PER_DAY;

/// Participant name used when an element cannot be attributed to any pool.
/// Operations owned by this sentinel keep their caller guard, which the
/// deployed contract can never satisfy until the owner assigns an address.
pub const UNKNOWN_PARTICIPANT: &str = "UnknownParticipant";

/// Operation names that are always part of the emitted contract.
/// A sanitized element name may not shadow any of these.
const FIXED_OPERATION_NAMES: [&str; 7] = [
    "startEvent",
    "gatewayAction",
    "updateParticipantAddress",
    "pause",
    "unpause",
    "resetElementState",
    "logAudit",
];

/// Check that the contract name is a valid Solidity identifier
pub fn validate_contract_name(name: &str) -> Result<(), Error> {
    let identifier = Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex");
    if identifier.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidContractName(name.to_string()))
    }
}

/// Check that an address is exactly 0x followed by 40 hex digits
pub fn validate_address(participant: &str, address: &str) -> Result<(), Error> {
    let hex_address = Regex::new("^0x[0-9a-fA-F]{40}$").expect("valid regex");
    if hex_address.is_match(address) {
        Ok(())
    } else {
        Err(Error::InvalidAddress(
            participant.to_string(),
            address.to_string(),
        ))
    }
}

/// Map each process ID to the display name of its owning pool.
/// If several participants claim the same process, the first occurrence wins.
pub fn process_to_participant(model: &BpmnModel) -> HashMap<String, String, ahash::RandomState> {
    let mut map = HashMap::default();
    for participant in &model.participants {
        let Some(process_id) = &participant.process_id else {
            continue;
        };
        if map.contains_key(process_id) {
            warn!(
                "process '{}' is claimed by more than one participant; keeping the first",
                process_id
            );
            continue;
        }
        map.insert(process_id.clone(), participant.name.clone());
    }
    map
}

/// IDs of the elements whose sequence flows point at the given element,
/// in document order. Message flows are not dependencies.
pub fn dependencies_of(element_id: &str, model: &BpmnModel) -> Vec<String> {
    model
        .sequence_flows
        .iter()
        .filter(|flow| flow.target_id == element_id)
        .map(|flow| flow.source_id.clone())
        .collect()
}

/// Find which pool is responsible for a process, or the sentinel if none is
pub fn participant_for(
    process_id: &str,
    index: &HashMap<String, String, ahash::RandomState>,
) -> String {
    index
        .get(process_id)
        .cloned()
        .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string())
}

/// Sanitize a BPMN element name into a Solidity function identifier:
/// non-alphanumeric characters become token separators, the first token is
/// lowercased, every later token is capitalized, and a leading digit gets
/// an 'f' prefix. Names that leave nothing usable produce "unnamedTask".
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();

    let mut result = String::new();
    for (i, token) in cleaned.split_whitespace().enumerate() {
        let mut chars = token.chars();
        let Some(first) = chars.next() else { continue };
        if i == 0 {
            result.push(first.to_ascii_lowercase());
            result.push_str(&chars.as_str().to_ascii_lowercase());
        } else {
            result.push(first.to_ascii_uppercase());
            for c in chars {
                result.push(c.to_ascii_lowercase());
            }
        }
    }

    if result.is_empty() {
        return String::from("unnamedTask");
    }
    if result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, 'f');
    }
    result
}

/// Timer trigger operations are named trigger + the capitalized sanitized name
fn trigger_name(original: &str) -> String {
    let sanitized = sanitize(original);
    let mut chars = sanitized.chars();
    match chars.next() {
        Some(first) => format!("trigger{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => String::from("trigger"),
    }
}

/// Interpret a timer's ISO-8601 duration payload as a number of blocks.
/// Only the "PnD" day form is supported; anything else falls back to 30 days
/// with a warning.
fn duration_in_blocks(timer: &TimerDefinition) -> u64 {
    match timer.duration.as_deref().map(str::trim) {
        Some(payload) => {
            if let Some(days) = payload
                .strip_prefix('P')
                .and_then(|rest| rest.strip_suffix('D'))
                .and_then(|days| days.parse::<u64>().ok())
            {
                return days * BLOCKS_PER_DAY;
            }
            warn!(
                "timer '{}' has unsupported duration '{}'; falling back to 30 days",
                timer.id, payload
            );
            DEFAULT_TIMER_BLOCKS
        }
        None => {
            warn!(
                "timer '{}' has no duration; falling back to 30 days",
                timer.id
            );
            DEFAULT_TIMER_BLOCKS
        }
    }
}

/// Resolve a gateway's yes/no branch targets from its labeled outgoing flows.
/// Either target may stay empty, which the dispatch treats as a dead end.
fn branch_targets(gateway_id: &str, model: &BpmnModel) -> (String, String) {
    let mut yes_target = String::new();
    let mut no_target = String::new();
    for flow in model.sequence_flows.iter().chain(model.message_flows.iter()) {
        if flow.source_id != gateway_id || !model.has_element(&flow.target_id) {
            continue;
        }
        match flow.name.as_deref() {
            Some(label) if label.eq_ignore_ascii_case("Yes") => {
                yes_target = flow.target_id.clone();
            }
            Some(label) if label.eq_ignore_ascii_case("No") => {
                no_target = flow.target_id.clone();
            }
            _ => {}
        }
    }
    (yes_target, no_target)
}

/// Tracks claimed operation names so that no two elements can end up with the
/// same Solidity signature
struct NameTable {
    claimed: HashMap<String, String, ahash::RandomState>,
}

impl NameTable {
    fn new() -> Self {
        let mut claimed: HashMap<String, String, ahash::RandomState> = HashMap::default();
        for fixed in FIXED_OPERATION_NAMES {
            claimed.insert(fixed.to_string(), fixed.to_string());
        }
        NameTable { claimed }
    }

    /// Claim a function name for an element, failing if it is already taken
    fn claim(&mut self, original: &str, function_name: String) -> Result<String, Error> {
        if let Some(previous) = self.claimed.get(&function_name) {
            return Err(Error::NameCollision(
                previous.clone(),
                original.to_string(),
            ));
        }
        self.claimed
            .insert(function_name.clone(), original.to_string());
        Ok(function_name)
    }
}

/// A single outgoing edge of an element in the emitted state machine.
/// Timer targets carry their block duration so arming can set the deadline.
#[derive(Debug, Clone)]
pub(crate) struct Successor {
    pub(crate) target_id: String,
    pub(crate) timer_blocks: Option<u64>,
}

/// An externally callable operation emitted for a task or catch event
#[derive(Debug, Clone)]
pub(crate) struct Operation {
    pub(crate) element_id: String,
    pub(crate) function_name: String,
    pub(crate) participant: String,
    pub(crate) dependencies: Vec<String>,
    pub(crate) successors: Vec<Successor>,
}

/// A timer trigger operation with its deadline duration in blocks
#[derive(Debug, Clone)]
pub(crate) struct Timer {
    pub(crate) id: String,
    pub(crate) function_name: String,
    pub(crate) blocks: u64,
    pub(crate) successors: Vec<Successor>,
}

/// Gateway metadata backing the shared gatewayAction dispatch
#[derive(Debug, Clone)]
pub(crate) struct Gateway {
    pub(crate) id: String,
    pub(crate) participant: String,
    pub(crate) dependencies: Vec<String>,
    pub(crate) yes_target_id: String,
    pub(crate) no_target_id: String,
}

/// The start event and its outgoing edges
#[derive(Debug, Clone)]
pub(crate) struct StartNode {
    pub(crate) id: String,
    pub(crate) participant: String,
    pub(crate) successors: Vec<Successor>,
}

/// An emission-ready contract. Displaying it renders the Solidity source;
/// rendering is pure, so two renders of the same contract are byte-identical.
#[derive(Debug, Clone)]
pub struct Contract {
    pub(crate) name: String,
    pub(crate) participants: Vec<(String, String)>,
    pub(crate) start: StartNode,
    pub(crate) tasks: Vec<Operation>,
    pub(crate) events: Vec<Operation>,
    pub(crate) gateways: Vec<Gateway>,
    pub(crate) timers: Vec<Timer>,
    pub(crate) end_event_ids: Vec<String>,
}

impl Contract {
    /// Derive a contract from a BPMN model, a contract name, and the
    /// participant address assignment (display name, address) in pool order
    pub fn new(
        model: &BpmnModel,
        name: &str,
        addresses: Vec<(String, String)>,
    ) -> Result<Contract, Error> {
        validate_contract_name(name)?;
        for (participant, address) in &addresses {
            validate_address(participant, address)?;
        }
        for participant in &model.participants {
            if !addresses.iter().any(|(name, _)| name == &participant.name) {
                return Err(Error::InvalidAddress(
                    participant.name.clone(),
                    String::from("<missing>"),
                ));
            }
        }

        let start_element = model
            .elements_of(ElementType::StartEvent)
            .next()
            .ok_or_else(|| Error::InvalidModel(missing_events()))?;
        if model.elements_of(ElementType::StartEvent).count() > 1 {
            warn!(
                "diagram has more than one start event; using '{}'",
                start_element.id
            );
        }
        if model.elements_of(ElementType::EndEvent).next().is_none() {
            return Err(Error::InvalidModel(missing_events()));
        }

        for flow in &model.sequence_flows {
            for endpoint in [&flow.source_id, &flow.target_id] {
                if !model.has_element(endpoint) {
                    return Err(Error::InvalidModel(format!(
                        "sequence flow '{}' references unknown element '{}'",
                        flow.id, endpoint
                    )));
                }
            }
        }

        let process_index = process_to_participant(model);
        let timer_blocks: HashMap<String, u64, ahash::RandomState> = model
            .timers
            .iter()
            .map(|timer| (timer.id.clone(), duration_in_blocks(timer)))
            .collect();

        // Successor arming is a local edge-rewrite: walk the outgoing sequence
        // and message flows of one element, never a global order. Message
        // flows anchored on a pool rather than an element are skipped.
        let successors_of = |element_id: &str| -> Vec<Successor> {
            model
                .sequence_flows
                .iter()
                .chain(model.message_flows.iter())
                .filter(|flow| flow.source_id == element_id && model.has_element(&flow.target_id))
                .map(|flow| Successor {
                    target_id: flow.target_id.clone(),
                    timer_blocks: timer_blocks.get(&flow.target_id).copied(),
                })
                .collect()
        };

        let owner_of = |element: &FlowElement| -> String {
            let participant = participant_for(&element.process_id, &process_index);
            if participant == UNKNOWN_PARTICIPANT {
                warn!("element '{}' has no owning participant", element.id);
            }
            participant
        };

        let mut names = NameTable::new();

        let mut tasks = Vec::new();
        for element in model.elements_of(ElementType::Task) {
            let original = element.name.clone().unwrap_or_else(|| element.id.clone());
            let function_name = names.claim(&original, sanitize(&original))?;
            tasks.push(Operation {
                element_id: element.id.clone(),
                function_name,
                participant: owner_of(element),
                dependencies: dependencies_of(&element.id, model),
                successors: successors_of(&element.id),
            });
        }

        let mut events = Vec::new();
        for element in model.elements_of(ElementType::IntermediateCatchEvent) {
            let original = element.name.clone().unwrap_or_else(|| element.id.clone());
            let function_name = names.claim(&original, sanitize(&original))?;
            events.push(Operation {
                element_id: element.id.clone(),
                function_name,
                participant: owner_of(element),
                dependencies: dependencies_of(&element.id, model),
                successors: successors_of(&element.id),
            });
        }

        let mut timers = Vec::new();
        for timer in &model.timers {
            let original = timer.name.clone().unwrap_or_else(|| timer.id.clone());
            let function_name = names.claim(&original, trigger_name(&original))?;
            timers.push(Timer {
                id: timer.id.clone(),
                function_name,
                blocks: timer_blocks[&timer.id],
                successors: successors_of(&timer.id),
            });
        }

        let mut gateways = Vec::new();
        for element in model.elements_of(ElementType::Gateway) {
            let (yes_target_id, no_target_id) = branch_targets(&element.id, model);
            gateways.push(Gateway {
                id: element.id.clone(),
                participant: owner_of(element),
                dependencies: dependencies_of(&element.id, model),
                yes_target_id,
                no_target_id,
            });
        }

        let start = StartNode {
            id: start_element.id.clone(),
            participant: owner_of(start_element),
            successors: successors_of(&start_element.id),
        };

        let end_event_ids = model
            .elements_of(ElementType::EndEvent)
            .map(|element| element.id.clone())
            .collect();

        Ok(Contract {
            name: name.to_string(),
            participants: addresses,
            start,
            tasks,
            events,
            gateways,
            timers,
            end_event_ids,
        })
    }
}

fn missing_events() -> String {
    String::from("at least one start event and one end event are required")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bpmn::{Flow, Participant};

    fn timer(id: &str, duration: Option<&str>) -> TimerDefinition {
        TimerDefinition {
            id: id.to_string(),
            name: None,
            duration: duration.map(String::from),
            process_id: String::from("Process_1"),
        }
    }

    #[test]
    fn sanitize_camel_cases_and_prefixes_digits() {
        assert_eq!(sanitize("Place order"), "placeOrder");
        assert_eq!(sanitize("5 Day Deadline"), "f5DayDeadline");
        assert_eq!(sanitize("Check & sign-off"), "checkSignOff");
        // The first token is lowercased in full
        assert_eq!(sanitize("HTTPCall"), "httpcall");
        assert_eq!(sanitize("HTTP Call"), "httpCall");
        assert_eq!(sanitize(""), "unnamedTask");
        assert_eq!(sanitize("   "), "unnamedTask");
        assert_eq!(sanitize("***"), "unnamedTask");
    }

    #[test]
    fn sanitize_is_idempotent_on_single_token_names() {
        // Single-token names settle on their all-lowercase form and stay there
        for name in ["myTask", "HTTPCall", "f5DayDeadline", "approve"] {
            let once = sanitize(name);
            assert_eq!(sanitize(&once), once, "sanitize not idempotent for {name:?}");
        }
    }

    #[test]
    fn trigger_names_are_capitalized() {
        assert_eq!(trigger_name("T"), "triggerT");
        assert_eq!(trigger_name("payment deadline"), "triggerPaymentDeadline");
    }

    #[test]
    fn contract_name_must_be_an_identifier() {
        assert!(validate_contract_name("OrderProcess").is_ok());
        assert!(validate_contract_name("_internal2").is_ok());
        assert!(validate_contract_name("").is_err());
        assert!(validate_contract_name("2Fast").is_err());
        assert!(validate_contract_name("has space").is_err());
    }

    #[test]
    fn address_must_be_40_hex_digits() {
        assert!(validate_address("P", "0x5B38Da6a701c568545dCfcB03FcB875f56beddC4").is_ok());
        assert!(validate_address("P", "0x5B38").is_err());
        assert!(validate_address("P", "5B38Da6a701c568545dCfcB03FcB875f56beddC4ab").is_err());
        assert!(validate_address("P", "0x5B38Da6a701c568545dCfcB03FcB875f56beddCG").is_err());
    }

    #[test]
    fn day_durations_become_blocks_and_everything_else_falls_back() {
        assert_eq!(duration_in_blocks(&timer("T", Some("P5D"))), 36000);
        assert_eq!(duration_in_blocks(&timer("T", Some("P1D"))), 7200);
        // Months, times, and garbage all take the 30 day fallback
        assert_eq!(duration_in_blocks(&timer("T", Some("P3M"))), 216000);
        assert_eq!(duration_in_blocks(&timer("T", Some("PT12H"))), 216000);
        assert_eq!(duration_in_blocks(&timer("T", Some("tomorrow"))), 216000);
        assert_eq!(duration_in_blocks(&timer("T", None)), 216000);
    }

    #[test]
    fn first_participant_wins_a_contested_process() {
        let model = BpmnModel {
            participants: vec![
                Participant {
                    id: String::from("P1"),
                    name: String::from("First"),
                    process_id: Some(String::from("Process_1")),
                },
                Participant {
                    id: String::from("P2"),
                    name: String::from("Second"),
                    process_id: Some(String::from("Process_1")),
                },
            ],
            ..BpmnModel::default()
        };
        let index = process_to_participant(&model);
        assert_eq!(index.get("Process_1").map(String::as_str), Some("First"));
    }

    #[test]
    fn dependencies_ignore_message_flows() {
        let model = BpmnModel {
            sequence_flows: vec![
                Flow {
                    id: String::from("F1"),
                    name: None,
                    source_id: String::from("A"),
                    target_id: String::from("M"),
                },
                Flow {
                    id: String::from("F2"),
                    name: None,
                    source_id: String::from("B"),
                    target_id: String::from("M"),
                },
            ],
            message_flows: vec![Flow {
                id: String::from("MF1"),
                name: None,
                source_id: String::from("C"),
                target_id: String::from("M"),
            }],
            ..BpmnModel::default()
        };
        assert_eq!(dependencies_of("M", &model), vec!["A", "B"]);
    }

    #[test]
    fn colliding_names_are_rejected() {
        let mut names = NameTable::new();
        assert!(names.claim("Do it", sanitize("Do it")).is_ok());
        match names.claim("do it!", sanitize("do it!")) {
            Err(Error::NameCollision(a, b)) => {
                assert_eq!(a, "Do it");
                assert_eq!(b, "do it!");
            }
            other => panic!("expected a name collision, got {other:?}"),
        }
    }

    #[test]
    fn element_names_may_not_shadow_fixed_operations() {
        let mut names = NameTable::new();
        assert!(matches!(
            names.claim("Pause", sanitize("Pause")),
            Err(Error::NameCollision(_, _))
        ));
    }
}
