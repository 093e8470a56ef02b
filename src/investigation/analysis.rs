use super::types::StepResult;

pub const ANALYSIS_PLACEHOLDER: &str = "Failed to generate analysis";

pub(crate) const ANALYST_SYSTEM_PROMPT: &str = "You are an infrastructure security and compliance expert.";

/// Successful outputs and failures, each as one line per step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultDigest {
    pub successful: Vec<String>,
    pub failed: Vec<String>,
}

impl ResultDigest {
    pub fn from_results(results: &[StepResult]) -> Self {
        let mut digest = Self::default();
        for result in results {
            if result.success {
                digest
                    .successful
                    .push(format!("Step {}: {}", result.step_number, result.result.trim()));
            } else {
                digest.failed.push(format!(
                    "Step {} failed: {}",
                    result.step_number,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }
        digest
    }
}

fn or_none(lines: &[String]) -> String {
    if lines.is_empty() {
        "None".to_string()
    } else {
        lines.join("\n")
    }
}

pub fn build_analysis_prompt(objective: &str, results: &[StepResult]) -> String {
    let digest = ResultDigest::from_results(results);
    format!(
        r#"Based on the investigation for "{objective}", here are the results:

Successful queries:
{successful}

Failed queries:
{failed}

Analyze these Steampipe query results and provide:
1. A summary of key findings
2. Security or compliance issues identified
3. Prioritized recommendations for remediation
4. Any cost optimization opportunities

Please provide a concise analysis of what we learned.
"#,
        objective = objective,
        successful = or_none(&digest.successful),
        failed = or_none(&digest.failed),
    )
}
