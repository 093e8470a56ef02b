//! Output formatting for JSON, YAML and human-readable text
//!
//! JSON and YAML are straight serde renderings of the report types; the
//! human format is hand-laid for the terminal.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::config::ShipwrightConfig;
use crate::conversation::{CostReport, SecurityAuditReport, ToolInvestigationReport};
use crate::investigation::InvestigationReport;
use crate::tools::{ToolKind, ToolResult};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";
const OK: &str = "\u{2713}";
const FAIL: &str = "\u{2717}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Machine-readable
    Json,
    Yaml,
    /// Formatted text for terminals
    Human,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub available: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HealthStatus {
    pub fn available(message: impl Into<String>) -> Self {
        Self {
            available: true,
            message: message.into(),
            details: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            available: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// One row of `shipwright tools`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolListing {
    pub name: String,
    pub description: String,
    pub actions: Vec<String>,
}

impl ToolListing {
    pub fn all() -> Vec<Self> {
        ToolKind::ALL
            .iter()
            .map(|kind| Self {
                name: kind.as_str().to_string(),
                description: kind.description().to_string(),
                actions: kind.actions().iter().map(|a| a.name.to_string()).collect(),
            })
            .collect()
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn serialized<T: Serialize>(&self, value: &T, what: &str) -> Result<Option<String>> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(value)
                .map(Some)
                .with_context(|| format!("Failed to serialize {} to JSON", what)),
            OutputFormat::Yaml => serde_yaml::to_string(value)
                .map(Some)
                .with_context(|| format!("Failed to serialize {} to YAML", what)),
            OutputFormat::Human => Ok(None),
        }
    }

    pub fn format_investigation(&self, report: &InvestigationReport) -> Result<String> {
        if let Some(out) = self.serialized(report, "investigation report")? {
            return Ok(out);
        }

        let mut out = String::new();
        let _ = writeln!(out, "Investigation: {}", report.objective);
        let _ = writeln!(out, "{}\n", RULE);
        let _ = writeln!(out, "Provider: {}", report.provider.display_name());
        let _ = writeln!(
            out,
            "Steps:    {} succeeded, {} failed\n",
            report.successful_steps(),
            report.failed_steps()
        );

        for (step, result) in report.steps.iter().zip(&report.results) {
            let symbol = if result.success { OK } else { FAIL };
            let _ = writeln!(out, "{} Step {}: {}", symbol, step.step_number, step.description);
            let _ = writeln!(out, "  Query: {}", result.query);
            let attempts = report.attempts_for(step.step_number).len();
            if attempts > 1 {
                let _ = writeln!(out, "  Attempts: {}", attempts);
            }
            if let Some(error) = &result.error {
                let _ = writeln!(out, "  Error: {}", error);
            }
            out.push('\n');
        }

        let _ = writeln!(out, "Analysis");
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "{}", report.analysis.trim());
        Ok(out)
    }

    pub fn format_tool_report(&self, report: &ToolInvestigationReport) -> Result<String> {
        if let Some(out) = self.serialized(report, "agent report")? {
            return Ok(out);
        }

        let mut out = String::new();
        let _ = writeln!(out, "Objective: {}", report.objective);
        let _ = writeln!(out, "{}\n", RULE);
        if report.tools_used.is_empty() {
            let _ = writeln!(out, "No tools were used.\n");
        }
        for result in &report.tools_used {
            let _ = writeln!(out, "{}", tool_line(result));
        }
        if !report.tools_used.is_empty() {
            out.push('\n');
        }
        let _ = writeln!(out, "Analysis");
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "{}", report.analysis.trim());
        Ok(out)
    }

    pub fn format_audit(&self, report: &SecurityAuditReport) -> Result<String> {
        if let Some(out) = self.serialized(report, "audit report")? {
            return Ok(out);
        }

        let mut out = String::new();
        let _ = writeln!(out, "{} Security Audit ({})", report.provider.display_name(), report.timestamp);
        let _ = writeln!(out, "{}\n", RULE);
        let _ = writeln!(out, "Tools executed: {}\n", report.tools_executed);
        let _ = writeln!(out, "{}", report.findings.trim());
        Ok(out)
    }

    pub fn format_cost(&self, report: &CostReport) -> Result<String> {
        if let Some(out) = self.serialized(report, "cost report")? {
            return Ok(out);
        }

        let mut out = String::new();
        let _ = writeln!(out, "Cost Analysis: {}", report.plan_file);
        let _ = writeln!(out, "{}\n", RULE);
        if !report.recommendations.is_empty() {
            let _ = writeln!(out, "Recommendations:");
            for (index, rec) in report.recommendations.iter().enumerate() {
                let _ = writeln!(out, "  {}. {}", index + 1, rec);
            }
            out.push('\n');
        }
        let _ = writeln!(out, "{}", report.analysis.trim());
        Ok(out)
    }

    pub fn format_tool_result(&self, result: &ToolResult) -> Result<String> {
        if let Some(out) = self.serialized(result, "tool result")? {
            return Ok(out);
        }
        Ok(match &result.error {
            Some(error) => format!("{}\n  Error: {}\n", tool_line(result), error),
            None => result.output.clone(),
        })
    }

    pub fn format_tools(&self, tools: &[ToolListing]) -> Result<String> {
        if let Some(out) = self.serialized(&tools, "tool list")? {
            return Ok(out);
        }

        let mut out = String::from("Registered Tools\n");
        let _ = writeln!(out, "{}\n", RULE);
        for tool in tools {
            let _ = writeln!(out, "{}", tool.name);
            let _ = writeln!(out, "  {}", tool.description);
            let _ = writeln!(out, "  Actions: {}", tool.actions.join(", "));
        }
        Ok(out)
    }

    pub fn format_health(&self, results: &BTreeMap<String, HealthStatus>) -> Result<String> {
        if let Some(out) = self.serialized(results, "health status")? {
            return Ok(out);
        }

        let mut out = String::from("Health Status\n");
        let _ = writeln!(out, "{}\n", RULE);
        for (name, status) in results {
            let symbol = if status.available { OK } else { FAIL };
            let _ = writeln!(out, "{} {}", symbol, name);
            let _ = writeln!(
                out,
                "  Status: {}",
                if status.available { "Available" } else { "Unavailable" }
            );
            let _ = writeln!(out, "  Message: {}", status.message);
            if let Some(details) = &status.details {
                let _ = writeln!(out, "  Details: {}", details);
            }
            out.push('\n');
        }
        Ok(out)
    }

    pub fn format_config(&self, config: &ShipwrightConfig) -> Result<String> {
        let map: BTreeMap<String, String> = config.to_display_map().into_iter().collect();
        if let Some(out) = self.serialized(&map, "config")? {
            return Ok(out);
        }

        let mut out = String::from("Configuration\n");
        let _ = writeln!(out, "{}\n", RULE);
        let width = map.keys().map(String::len).max().unwrap_or(0);
        for (key, value) in &map {
            let _ = writeln!(out, "{:<width$}  {}", key, value, width = width);
        }
        Ok(out)
    }
}

fn tool_line(result: &ToolResult) -> String {
    let symbol = if result.is_error() { FAIL } else { OK };
    format!("{} {} {}", symbol, result.tool, result.action)
}
