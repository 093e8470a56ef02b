//! Plan, execute, diagnose, repair
//!
//! Steps run strictly in order. Each step gets up to `max_retries`
//! attempts; between attempts the failing query is repaired, first from
//! the static rule table, then by the model. Every attempt lands in the
//! report's audit log.

use super::analysis::{build_analysis_prompt, ANALYSIS_PLACEHOLDER, ANALYST_SYSTEM_PROMPT};
use super::planner::QueryPlanner;
use super::repair::{deterministic_repair, llm_repair};
use super::schema::SchemaHints;
use super::types::{
    ExecutedQuery, InvestigationError, InvestigationReport, InvestigationStep, StepResult,
};
use crate::cloud::CloudProvider;
use crate::config::DEFAULT_MAX_RETRIES;
use crate::llm::{complete, LLMClient};
use crate::tools::{provider_credentials, Credentials, QueryRunner};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct InvestigationAgent {
    llm: Arc<dyn LLMClient>,
    runner: Arc<dyn QueryRunner>,
    planner: QueryPlanner,
    max_retries: u32,
    default_region: String,
}

enum Repair {
    Fixed(String),
    Unavailable,
    Cancelled,
}

impl InvestigationAgent {
    pub fn new(llm: Arc<dyn LLMClient>, runner: Arc<dyn QueryRunner>) -> Self {
        Self {
            planner: QueryPlanner::new(llm.clone()),
            llm,
            runner,
            max_retries: DEFAULT_MAX_RETRIES as u32,
            default_region: crate::config::DEFAULT_REGION.to_string(),
        }
    }

    /// At least one attempt is always made.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_default_region(mut self, region: impl Into<String>) -> Self {
        self.default_region = region.into();
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Runs a full investigation with credentials taken from the environment.
    pub async fn investigate(
        &self,
        objective: &str,
        provider: CloudProvider,
        cancel: &CancellationToken,
    ) -> Result<InvestigationReport, InvestigationError> {
        let credentials = provider_credentials(provider, &self.default_region);
        self.investigate_with_credentials(objective, provider, &credentials, cancel)
            .await
    }

    /// Always yields a report unless the objective is empty or the run is
    /// cancelled before a plan exists.
    pub async fn investigate_with_credentials(
        &self,
        objective: &str,
        provider: CloudProvider,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<InvestigationReport, InvestigationError> {
        let objective = objective.trim();
        if objective.is_empty() {
            return Err(InvestigationError::EmptyObjective);
        }

        info!(provider = %provider, objective, "Starting investigation");
        let hints = SchemaHints::for_provider(provider);
        let steps = self.planner.plan(objective, &hints, cancel).await?;

        let mut results = Vec::with_capacity(steps.len());
        let mut executed_queries = Vec::new();
        for step in &steps {
            info!(step = step.step_number, description = %step.description, "Executing step");
            let result = self
                .execute_step(step, credentials, &mut executed_queries, cancel)
                .await;
            if !result.success {
                warn!(
                    step = step.step_number,
                    error = result.error.as_deref().unwrap_or_default(),
                    "Step failed after retries"
                );
            }
            results.push(result);
        }

        let analysis = self.final_analysis(objective, &results, cancel).await;

        Ok(InvestigationReport {
            objective: objective.to_string(),
            provider,
            steps,
            results,
            executed_queries,
            analysis,
        })
    }

    /// Runs one step to a terminal state, appending every attempt to `log`.
    pub async fn execute_step(
        &self,
        step: &InvestigationStep,
        credentials: &Credentials,
        log: &mut Vec<ExecutedQuery>,
        cancel: &CancellationToken,
    ) -> StepResult {
        let mut current = step.clone();
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            if cancel.is_cancelled() {
                last_error = InvestigationError::Cancelled.to_string();
                break;
            }
            debug!(step = step.step_number, attempt, query = %current.query, "Attempting query");

            let outcome = self
                .runner
                .run_query(current.provider, &current.query, credentials, cancel)
                .await;

            let error = match outcome {
                Ok(result) => {
                    log.push(ExecutedQuery {
                        step_number: step.step_number,
                        query: current.query.clone(),
                        attempt,
                        error: None,
                        result: Some(result.clone()),
                    });
                    return StepResult::success(&current, result);
                }
                Err(e) => e,
            };

            last_error = error.to_string();
            log.push(ExecutedQuery {
                step_number: step.step_number,
                query: current.query.clone(),
                attempt,
                error: Some(last_error.clone()),
                result: None,
            });

            if error.is_cancelled() || attempt >= self.max_retries {
                break;
            }

            match self.repair(&current, &last_error, cancel).await {
                Repair::Fixed(query) => {
                    info!(
                        step = step.step_number,
                        original = %current.query,
                        fixed = %query,
                        "Retrying with fixed query"
                    );
                    current = current.with_query(query);
                }
                Repair::Unavailable => {
                    warn!(step = step.step_number, error = %last_error, "Cannot automatically fix query");
                    break;
                }
                Repair::Cancelled => break,
            }
        }

        StepResult::failure(&current, last_error)
    }

    async fn repair(&self, step: &InvestigationStep, error: &str, cancel: &CancellationToken) -> Repair {
        if let Some(fixed) = deterministic_repair(step.provider, &step.query, error) {
            return Repair::Fixed(fixed);
        }

        match llm_repair(self.llm.as_ref(), step.provider, &step.query, error, cancel).await {
            Ok(Some(fixed)) => Repair::Fixed(fixed),
            Ok(None) => Repair::Unavailable,
            Err(e) if e.is_cancelled() => Repair::Cancelled,
            Err(e) => {
                debug!(error = %e, "Model repair failed");
                Repair::Unavailable
            }
        }
    }

    async fn final_analysis(
        &self,
        objective: &str,
        results: &[StepResult],
        cancel: &CancellationToken,
    ) -> String {
        let prompt = build_analysis_prompt(objective, results);
        match complete(self.llm.as_ref(), Some(ANALYST_SYSTEM_PROMPT), &prompt, cancel).await {
            Ok(analysis) if !analysis.trim().is_empty() => analysis.trim().to_string(),
            Ok(_) => ANALYSIS_PLACEHOLDER.to_string(),
            Err(e) => {
                warn!(error = %e, "Final analysis failed");
                ANALYSIS_PLACEHOLDER.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLLMClient, MockResponse};
    use crate::tools::QueryError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Runner that replays scripted outcomes and records the queries it saw.
    #[derive(Default)]
    struct ScriptedRunner {
        outcomes: Mutex<VecDeque<Result<String, String>>>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new(outcomes: Vec<Result<&str, &str>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(
                    outcomes
                        .into_iter()
                        .map(|o| o.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                queries: Mutex::new(Vec::new()),
            })
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryRunner for ScriptedRunner {
        async fn run_query(
            &self,
            _provider: CloudProvider,
            query: &str,
            _credentials: &Credentials,
            _cancel: &CancellationToken,
        ) -> Result<String, QueryError> {
            self.queries.lock().unwrap().push(query.to_string());
            match self.outcomes.lock().unwrap().pop_front() {
                Some(Ok(out)) => Ok(out),
                Some(Err(err)) => Err(QueryError::Failed(err)),
                None => Err(QueryError::Empty),
            }
        }
    }

    fn step(query: &str) -> InvestigationStep {
        InvestigationStep::new(1, CloudProvider::Aws, "d", query, "i")
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let runner = ScriptedRunner::new(vec![Ok("[]")]);
        let llm = Arc::new(MockLLMClient::new());
        let agent = InvestigationAgent::new(llm.clone(), runner.clone());

        let mut log = Vec::new();
        let result = agent
            .execute_step(&step("SELECT 1"), &Credentials::new(), &mut log, &CancellationToken::new())
            .await;

        assert!(result.success);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].attempt, 1);
        assert!(log[0].succeeded());
        assert_eq!(llm.request_count(), 0);
    }

    #[tokio::test]
    async fn test_llm_repair_path() {
        let runner = ScriptedRunner::new(vec![Err("relation \"aws_ec2\" does not exist"), Ok("rows")]);
        let llm = Arc::new(MockLLMClient::new());
        llm.add_response(MockResponse::text("```sql\nSELECT instance_id FROM aws_ec2_instance\n```"));
        let agent = InvestigationAgent::new(llm.clone(), runner.clone());

        let mut log = Vec::new();
        let result = agent
            .execute_step(
                &step("SELECT instance_id FROM aws_ec2"),
                &Credentials::new(),
                &mut log,
                &CancellationToken::new(),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.query, "SELECT instance_id FROM aws_ec2_instance");
        assert_eq!(runner.queries()[1], "SELECT instance_id FROM aws_ec2_instance");
        assert_eq!(log.iter().map(|q| q.attempt).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_stops_when_no_repair_available() {
        let runner = ScriptedRunner::new(vec![Err("permission denied"), Ok("never")]);
        let llm = Arc::new(MockLLMClient::new());
        llm.add_response(MockResponse::error(crate::llm::BackendError::NetworkError {
            message: "down".to_string(),
        }));
        let agent = InvestigationAgent::new(llm, runner.clone());

        let mut log = Vec::new();
        let result = agent
            .execute_step(&step("SELECT 1"), &Credentials::new(), &mut log, &CancellationToken::new())
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("permission denied"));
        assert_eq!(log.len(), 1);
        assert_eq!(runner.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausts_retry_budget() {
        let error = "column \"running\" does not exist";
        let runner = ScriptedRunner::new(vec![Err(error), Err("still broken"), Err("again")]);
        let llm = Arc::new(MockLLMClient::new());
        llm.add_response(MockResponse::text("SELECT 2"));
        let agent = InvestigationAgent::new(llm, runner.clone()).with_max_retries(3);

        let mut log = Vec::new();
        let result = agent
            .execute_step(
                &step("SELECT * FROM aws_ec2_instance WHERE running"),
                &Credentials::new(),
                &mut log,
                &CancellationToken::new(),
            )
            .await;

        assert!(!result.success);
        assert_eq!(log.len(), 3);
        assert_eq!(result.query, "SELECT 2");
        assert!(result.error.unwrap().contains("again"));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let runner = ScriptedRunner::new(vec![Ok("rows")]);
        let agent = InvestigationAgent::new(Arc::new(MockLLMClient::new()), runner.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut log = Vec::new();
        let result = agent
            .execute_step(&step("SELECT 1"), &Credentials::new(), &mut log, &cancel)
            .await;

        assert!(!result.success);
        assert!(log.is_empty());
        assert!(runner.queries().is_empty());
    }

    #[tokio::test]
    async fn test_empty_objective() {
        let agent = InvestigationAgent::new(
            Arc::new(MockLLMClient::new()),
            ScriptedRunner::new(vec![]),
        );
        let result = agent
            .investigate_with_credentials("  ", CloudProvider::Aws, &Credentials::new(), &CancellationToken::new())
            .await;
        assert_eq!(result, Err(InvestigationError::EmptyObjective));
    }

    #[test]
    fn test_max_retries_floor() {
        let agent = InvestigationAgent::new(
            Arc::new(MockLLMClient::new()),
            ScriptedRunner::new(vec![]),
        )
        .with_max_retries(0);
        assert_eq!(agent.max_retries(), 1);
    }
}
