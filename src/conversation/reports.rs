use crate::cloud::CloudProvider;
use crate::tools::ToolResult;
use serde::{Deserialize, Serialize};

/// Outcome of one tool-use conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvestigationReport {
    pub objective: String,
    pub tools_used: Vec<ToolResult>,
    pub analysis: String,
    /// Model turns taken, including the closing summary request.
    pub turns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAuditReport {
    pub provider: CloudProvider,
    pub tools_executed: usize,
    pub findings: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostReport {
    pub plan_file: String,
    pub analysis: String,
    pub tools_used: usize,
    pub recommendations: Vec<String>,
}

/// Numbered (`1.`, `2)`) and bulleted (`-`, `*`, `•`) lines of `analysis`,
/// with the marker removed.
pub fn extract_recommendations(analysis: &str) -> Vec<String> {
    analysis
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let rest = if let Some(rest) = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| line.strip_prefix("• "))
            {
                rest
            } else {
                let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
                if digits == 0 {
                    return None;
                }
                line[digits..]
                    .strip_prefix(". ")
                    .or_else(|| line[digits..].strip_prefix(") "))?
            };
            let rest = rest.trim().trim_matches('*').trim();
            (!rest.is_empty()).then(|| rest.to_string())
        })
        .collect()
}
