use crate::cloud::CloudProvider;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvestigationError {
    #[error("Investigation cancelled")]
    Cancelled,

    #[error("Investigation objective is empty")]
    EmptyObjective,
}

/// One planned query. The query text of a step is never edited in place;
/// repair produces a new step through [`InvestigationStep::with_query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationStep {
    pub step_number: u32,
    pub description: String,
    pub provider: CloudProvider,
    pub query: String,
    pub expected_insights: String,
}

impl InvestigationStep {
    pub fn new(
        step_number: u32,
        provider: CloudProvider,
        description: impl Into<String>,
        query: impl Into<String>,
        expected_insights: impl Into<String>,
    ) -> Self {
        Self {
            step_number,
            description: description.into(),
            provider,
            query: query.into(),
            expected_insights: expected_insights.into(),
        }
    }

    pub fn with_query(&self, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..self.clone()
        }
    }
}

/// Step as written by the model; every field is optional so one sloppy
/// entry does not sink the whole plan.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawStep {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub expected_insights: Option<String>,
}

/// Audit entry for a single attempt of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedQuery {
    pub step_number: u32,
    pub query: String,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ExecutedQuery {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_number: u32,
    pub query: String,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
}

impl StepResult {
    pub fn success(step: &InvestigationStep, result: impl Into<String>) -> Self {
        Self {
            step_number: step.step_number,
            query: step.query.clone(),
            result: result.into(),
            error: None,
            success: true,
        }
    }

    pub fn failure(step: &InvestigationStep, error: impl Into<String>) -> Self {
        Self {
            step_number: step.step_number,
            query: step.query.clone(),
            result: String::new(),
            error: Some(error.into()),
            success: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationReport {
    pub objective: String,
    pub provider: CloudProvider,
    pub steps: Vec<InvestigationStep>,
    pub results: Vec<StepResult>,
    pub executed_queries: Vec<ExecutedQuery>,
    pub analysis: String,
}

impl InvestigationReport {
    pub fn successful_steps(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed_steps(&self) -> usize {
        self.results.len() - self.successful_steps()
    }

    pub fn attempts_for(&self, step_number: u32) -> Vec<&ExecutedQuery> {
        self.executed_queries
            .iter()
            .filter(|q| q.step_number == step_number)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_query_keeps_identity() {
        let step = InvestigationStep::new(2, CloudProvider::Aws, "d", "SELECT 1", "i");
        let repaired = step.with_query("SELECT 2");
        assert_eq!(repaired.step_number, 2);
        assert_eq!(repaired.query, "SELECT 2");
        assert_eq!(step.query, "SELECT 1");
    }

    #[test]
    fn test_raw_step_lenient() {
        let raw: RawStep =
            serde_json::from_str(r#"{"step_number": "3", "query": "SELECT 1", "extra": true}"#)
                .unwrap();
        assert_eq!(raw.step_number, Some(3));
        assert_eq!(raw.query.as_deref(), Some("SELECT 1"));
        assert!(raw.description.is_none());
    }

    #[test]
    fn test_report_counts() {
        let step = InvestigationStep::new(1, CloudProvider::Aws, "d", "q", "i");
        let report = InvestigationReport {
            objective: "o".to_string(),
            provider: CloudProvider::Aws,
            steps: vec![step.clone()],
            results: vec![StepResult::success(&step, "r"), StepResult::failure(&step, "e")],
            executed_queries: vec![],
            analysis: String::new(),
        };
        assert_eq!(report.successful_steps(), 1);
        assert_eq!(report.failed_steps(), 1);
    }
}
