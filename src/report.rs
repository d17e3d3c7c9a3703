//! Violation sink: log routing and printable output.

use serde::Serialize;

use crate::validation::ValidationReport;
use crate::validators::Violation;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain text output.
    #[default]
    Plain,
    /// JSON output.
    Json,
}

/// Split violations into errors (`level <= threshold`) and the rest.
pub fn partition(violations: &[Violation], threshold: u32) -> (Vec<&Violation>, Vec<&Violation>) {
    violations.iter().partition(|v| v.level <= threshold)
}

/// Log violations: one `error` record for those at or below the threshold,
/// one `info` record for the others.
pub fn log_violations(violations: &[Violation], threshold: u32) {
    if violations.is_empty() {
        log::info!("all resources are valid");
        return;
    }

    let (errors, infos) = partition(violations, threshold);
    if !errors.is_empty() {
        log::error!("{} violations:\n{}", errors.len(), bullet_list(&errors));
    }
    if !infos.is_empty() {
        log::info!("{} violations:\n{}", infos.len(), bullet_list(&infos));
    }
}

fn bullet_list(violations: &[&Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the final violations of a run.
pub fn format(report: &ValidationReport, violations: &[Violation], output: OutputFormat) -> String {
    match output {
        OutputFormat::Plain => format_plain(report, violations),
        OutputFormat::Json => format_json(report, violations),
    }
}

fn format_plain(report: &ValidationReport, violations: &[Violation]) -> String {
    let mut output = String::new();

    if report.aborted {
        output.push_str("Validation aborted\n");
        return output;
    }

    for violation in violations {
        output.push_str(&format!(
            "{}:{} {} [{}] {} (level {})\n",
            violation.target.namespace,
            violation.target.kind,
            violation.target.name,
            violation.validator,
            violation.message,
            violation.level
        ));
    }
    for failure in &report.failures {
        output.push_str(&format!("error: {}\n", failure));
    }

    if violations.is_empty() && report.failures.is_empty() {
        output.push_str("All resources are valid\n");
    } else {
        output.push_str(&format!(
            "\n{} violations, {} validator errors\n",
            violations.len(),
            report.failures.len()
        ));
    }
    output
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    aborted: bool,
    violations: &'a [Violation],
    errors: Vec<JsonFailure<'a>>,
}

#[derive(Serialize)]
struct JsonFailure<'a> {
    validator: &'a str,
    error: String,
}

fn format_json(report: &ValidationReport, violations: &[Violation]) -> String {
    let output = JsonOutput {
        aborted: report.aborted,
        violations,
        errors: report
            .failures
            .iter()
            .map(|f| JsonFailure {
                validator: &f.validator,
                error: f.error.to_string(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
}
