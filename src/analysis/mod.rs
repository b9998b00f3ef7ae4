//! Post-generation security analysis for the emitted contract: drives the
//! Slither static analyzer as a child process, applies a set of regex lint
//! checks over the Solidity text, and consolidates both into a report file.
//!
//! Nothing in here is fatal to compilation: a missing analyzer binary or a
//! failing check is logged and recorded in the report.

use std::env;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;
use regex::Regex;

use crate::error::Error;

/// Working directory for the analyzer child process
const WORKDIR_VAR: &str = "ANALYZER_WORKDIR";
/// Import remap argument passed through to the analyzer
const REMAP_VAR: &str = "ANALYZER_REMAP";
const DEFAULT_REMAP: &str = "@openzeppelin=node_modules/@openzeppelin";

/// Consolidated outcome of the Slither run and the custom lint checks
#[derive(Debug, Default)]
pub struct SecurityAnalysisResult {
    pub slither_findings: Vec<String>,
    pub custom_findings: Vec<String>,
    pub has_errors: bool,
}

/// Run the full post-generation analysis over the just-written contract file
/// and write the consolidated report. Analyzer problems are folded into the
/// report instead of propagating; only report IO itself can fail.
pub fn run(file_name: &str) -> Result<String, Error> {
    let mut result = SecurityAnalysisResult::default();

    if let Err(e) = analyze_with_slither(file_name, &mut result) {
        warn!("Slither analysis failed: {}", e);
        result
            .slither_findings
            .push(format!("Error during Slither analysis: {}", e));
    }

    match fs::read_to_string(file_name) {
        Ok(solidity_code) => {
            let findings = custom_security_checks(&solidity_code);
            if findings.is_empty() {
                println!("No vulnerabilities detected with custom checks.");
            } else {
                println!("=== Detected Vulnerabilities (Custom Checks) ===");
                for finding in &findings {
                    println!("- {}", finding);
                }
            }
            result.custom_findings.extend(findings);
        }
        Err(e) => warn!("Custom security checks failed: {}", e),
    }

    generate_security_report(&result)
}

/// Spawn Slither over the contract file, echo its merged output, and group
/// it into findings. Returns the analyzer's exit code.
pub fn analyze_with_slither(
    file_name: &str,
    result: &mut SecurityAnalysisResult,
) -> Result<i32, Error> {
    let working_directory = env::var(WORKDIR_VAR).unwrap_or_else(|_| String::from("."));
    let remap = env::var(REMAP_VAR).unwrap_or_else(|_| String::from(DEFAULT_REMAP));

    let workdir = Path::new(&working_directory);
    if !workdir.is_dir() {
        return Err(Error::IO(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!(
                "working directory {} does not exist or is not a directory",
                working_directory
            ),
        )));
    }

    println!("Running Slither analysis...");
    println!("Command: slither {} --solc-remaps {}", file_name, remap);

    let mut child = Command::new("slither")
        .arg(file_name)
        .arg("--solc-remaps")
        .arg(&remap)
        .current_dir(workdir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(Error::IO)?;

    // Slither reports on stderr as well. Both pipes are read on helper
    // threads feeding one channel, so the two streams stay merged in
    // arrival order and the child never blocks on a full pipe.
    let (sender, receiver) = mpsc::channel();
    let stdout_reader = stream_lines(child.stdout.take(), sender.clone());
    let stderr_reader = stream_lines(child.stderr.take(), sender);

    println!();
    println!("=== Vulnerability Analysis with Slither ===");
    let mut current_finding = String::new();
    for line in receiver {
        consume_line(&line, result, &mut current_finding);
    }
    if !current_finding.is_empty() {
        result.slither_findings.push(current_finding);
    }
    let _ = stdout_reader.join();
    let _ = stderr_reader.join();

    let status = child.wait().map_err(Error::IO)?;
    let exit_code = status.code().unwrap_or(-1);

    println!();
    println!("=== Analysis Result ===");
    if result.has_errors {
        println!("Errors occurred during Slither analysis.");
    } else if exit_code != 0 || !result.slither_findings.is_empty() {
        println!("Slither detected possible warnings. Check the report for details.");
    } else {
        println!("Slither did not detect critical vulnerabilities.");
    }
    Ok(exit_code)
}

/// Read one of the child's pipes line-by-line into the shared channel.
/// The channel closes once both pipe readers have finished.
fn stream_lines<R: Read + Send + 'static>(
    stream: Option<R>,
    sender: mpsc::Sender<String>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        if let Some(stream) = stream {
            for line in BufReader::new(stream).lines().map_while(Result::ok) {
                if sender.send(line).is_err() {
                    break;
                }
            }
        }
    })
}

/// Echo one line of analyzer output and group it into findings.
/// A new finding starts on a detector or warning marker; error lines are
/// recorded standalone and mark the whole run as failed.
fn consume_line(line: &str, result: &mut SecurityAnalysisResult, current_finding: &mut String) {
    println!("{}", line);

    if line.contains("Error:") || line.contains("error:") {
        result.has_errors = true;
        result.slither_findings.push(format!("Error: {}", line));
    } else if line.starts_with("INFO:Detectors:") || line.starts_with("WARNING:") {
        if !current_finding.is_empty() {
            result.slither_findings.push(std::mem::take(current_finding));
        }
        current_finding.push_str(line);
        current_finding.push('\n');
    } else if !current_finding.is_empty() {
        current_finding.push_str(line);
        current_finding.push('\n');
    }
}

/// Regex lint checks over the emitted Solidity source
pub fn custom_security_checks(solidity_code: &str) -> Vec<String> {
    let mut findings = Vec::new();

    if solidity_code.contains(".call(") && !solidity_code.contains("require(success)") {
        findings.push(String::from("Use of '.call' without success verification."));
    }

    // Public functions should carry at least one of the access or
    // reentrancy modifiers within their signature tail
    let public_function =
        Regex::new(r"function\s+\w+\s*\([^)]*\)\s*public").expect("valid regex");
    for matched in public_function.find_iter(solidity_code) {
        let snippet: String = solidity_code[matched.end()..].chars().take(200).collect();
        let has_security_check = snippet.contains("onlyOwner")
            || snippet.contains("onlyParticipant")
            || snippet.contains("nonReentrant")
            || snippet.contains("whenNotPaused");
        if !has_security_check {
            findings.push(format!(
                "Public function without adequate security controls: {}",
                matched.as_str()
            ));
        }
    }

    if solidity_code.contains(".transfer(") || solidity_code.contains(".send(") {
        findings.push(String::from(
            "Use of transfer/send instead of the recommended call pattern.",
        ));
    }

    let public_state =
        Regex::new(r"(uint|int|address|bool|string)\s+public\s+\w+").expect("valid regex");
    for matched in public_state.find_iter(solidity_code) {
        findings.push(format!(
            "Public state variable found: {}. Consider using private + getters.",
            matched.as_str()
        ));
    }

    findings
}

/// Render the consolidated report text
fn render_report(result: &SecurityAnalysisResult) -> String {
    let mut report = String::new();
    report.push_str("=== Smart Contract Security Report ===\n\n");

    report.push_str("1. Analysis with Slither:\n\n");
    if result.slither_findings.is_empty() {
        report.push_str("   No critical vulnerabilities detected\n\n");
    } else {
        report.push_str("   Analysis results:\n\n");
        for finding in &result.slither_findings {
            for line in finding.lines() {
                report.push_str("   ");
                report.push_str(line);
                report.push('\n');
            }
        }
        report.push('\n');
    }

    report.push_str("2. Custom Security Checks:\n");
    if result.custom_findings.is_empty() {
        report.push_str("   All custom checks passed.\n\n");
    } else {
        for finding in &result.custom_findings {
            report.push_str("   ");
            report.push_str(finding);
            report.push('\n');
        }
    }

    report.push_str("\n3. Deployment Recommendations:\n");
    report.push_str("   - Test thoroughly on a testnet.\n");
    report.push_str("   - Verify roles and permissions.\n");
    report.push_str("   - Document participant addresses.\n\n");

    report.push_str("4. BPMN Workflow Specific Notes:\n");
    report.push_str("   - Ensure correct usage of gatewayAction(gatewayId, bool).\n");
    report.push_str("   - Document each gateway's yes/no logic.\n");
    report
}

/// Write the report next to the contract and return its file name
pub fn generate_security_report(result: &SecurityAnalysisResult) -> Result<String, Error> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    let report_file = format!("SecurityReport_{}.txt", millis);
    fs::write(&report_file, render_report(result)).map_err(Error::IO)?;
    println!("Detailed security report generated: {}", report_file);
    Ok(report_file)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unchecked_low_level_call_is_flagged() {
        let code = "contract X { function f() public nonReentrant { target.call(data); } }";
        let findings = custom_security_checks(code);
        assert!(findings.iter().any(|f| f.contains("'.call' without success verification")));

        let checked = "function f() public nonReentrant { (bool success, ) = target.call(data); require(success); }";
        assert!(!custom_security_checks(checked)
            .iter()
            .any(|f| f.contains("'.call'")));
    }

    #[test]
    fn unguarded_public_functions_are_flagged() {
        let code = "function open() public {\n    counter += 1;\n}";
        let findings = custom_security_checks(code);
        assert!(findings
            .iter()
            .any(|f| f.contains("Public function without adequate security controls")));

        let guarded = "function closed() public onlyOwner {\n    counter += 1;\n}";
        assert!(custom_security_checks(guarded).is_empty());
    }

    #[test]
    fn transfer_and_public_primitives_are_flagged() {
        let code = "uint public counter;\nfunction f() public nonReentrant { payable(a).transfer(1); }";
        let findings = custom_security_checks(code);
        assert!(findings.iter().any(|f| f.contains("transfer/send")));
        assert!(findings.iter().any(|f| f.contains("Public state variable found: uint public counter")));
    }

    #[test]
    fn emitted_contracts_pass_the_custom_checks() -> Result<(), crate::error::Error> {
        use crate::bpmn::{BpmnModel, ElementType, Flow, FlowElement, Participant};
        let model = BpmnModel {
            participants: vec![Participant {
                id: String::from("Pool_1"),
                name: String::from("P1"),
                process_id: Some(String::from("Process_1")),
            }],
            elements: vec![
                FlowElement {
                    id: String::from("Start"),
                    name: None,
                    element_type: ElementType::StartEvent,
                    process_id: String::from("Process_1"),
                },
                FlowElement {
                    id: String::from("A"),
                    name: Some(String::from("A")),
                    element_type: ElementType::Task,
                    process_id: String::from("Process_1"),
                },
                FlowElement {
                    id: String::from("End"),
                    name: None,
                    element_type: ElementType::EndEvent,
                    process_id: String::from("Process_1"),
                },
            ],
            sequence_flows: vec![
                Flow {
                    id: String::from("F1"),
                    name: None,
                    source_id: String::from("Start"),
                    target_id: String::from("A"),
                },
                Flow {
                    id: String::from("F2"),
                    name: None,
                    source_id: String::from("A"),
                    target_id: String::from("End"),
                },
            ],
            ..BpmnModel::default()
        };
        let contract = crate::contract::Contract::new(
            &model,
            "Clean",
            vec![(
                String::from("P1"),
                String::from("0x5B38Da6a701c568545dCfcB03FcB875f56beddC4"),
            )],
        )?;
        assert!(custom_security_checks(&contract.to_string()).is_empty());
        Ok(())
    }

    #[test]
    fn analyzer_lines_group_into_findings() {
        let mut result = SecurityAnalysisResult::default();
        let mut current = String::new();
        for line in [
            "INFO:Detectors: reentrancy in foo()",
            "    external call before state write",
            "WARNING: pragma is floating",
            "Error: solc not found",
        ] {
            consume_line(line, &mut result, &mut current);
        }
        if !current.is_empty() {
            result.slither_findings.push(current);
        }

        assert!(result.has_errors);
        assert_eq!(result.slither_findings.len(), 3);
        assert!(result.slither_findings[0].starts_with("INFO:Detectors:"));
        assert!(result.slither_findings[0].contains("external call"));
        assert!(result.slither_findings[1].starts_with("Error: "));
        assert!(result.slither_findings[2].starts_with("WARNING:"));
    }

    #[test]
    fn report_has_all_four_sections() {
        let result = SecurityAnalysisResult {
            slither_findings: vec![String::from("INFO:Detectors: something\n")],
            custom_findings: vec![String::from("Public state variable found: uint public x.")],
            has_errors: false,
        };
        let report = render_report(&result);
        assert!(report.starts_with("=== Smart Contract Security Report ==="));
        assert!(report.contains("1. Analysis with Slither:"));
        assert!(report.contains("   INFO:Detectors: something"));
        assert!(report.contains("2. Custom Security Checks:"));
        assert!(report.contains("   Public state variable found: uint public x."));
        assert!(report.contains("3. Deployment Recommendations:"));
        assert!(report.contains("4. BPMN Workflow Specific Notes:"));
    }
}
