//! Investigation loop against scripted model replies and a scripted sandbox
//!
//! Queries flow through the real `SteampipeRunner`, so failures are
//! detected from steampipe's own output exactly as in production.

use serde_json::json;
use shipwright::cloud::CloudProvider;
use shipwright::investigation::{
    fallback_plan, InvestigationAgent, InvestigationReport, ANALYSIS_PLACEHOLDER,
};
use shipwright::llm::{BackendError, MockLLMClient, MockResponse};
use shipwright::sandbox::{ExecOutput, MockSandbox, SandboxError};
use shipwright::tools::{Credentials, SteampipeRunner};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn plan_reply(queries: &[&str]) -> String {
    let steps: Vec<_> = queries
        .iter()
        .enumerate()
        .map(|(i, q)| {
            json!({
                "step_number": i + 1,
                "description": format!("step {}", i + 1),
                "provider": "aws",
                "query": q,
                "expected_insights": "insight",
            })
        })
        .collect();
    format!("Here is the plan:\n```json\n{}\n```", serde_json::to_string_pretty(&steps).unwrap())
}

fn steampipe_error(message: &str) -> ExecOutput {
    ExecOutput::new(format!("Error: {}\nEXIT_CODE:1", message), "", 0)
}

struct Harness {
    llm: Arc<MockLLMClient>,
    sandbox: Arc<MockSandbox>,
    agent: InvestigationAgent,
}

fn harness(max_retries: u32) -> Harness {
    let llm = Arc::new(MockLLMClient::new());
    let sandbox = Arc::new(MockSandbox::new());
    let runner = Arc::new(SteampipeRunner::new(sandbox.clone(), "us-east-1"));
    let agent = InvestigationAgent::new(llm.clone(), runner).with_max_retries(max_retries);
    Harness { llm, sandbox, agent }
}

async fn run(h: &Harness, objective: &str) -> InvestigationReport {
    h.agent
        .investigate_with_credentials(objective, CloudProvider::Aws, &Credentials::new(), &CancellationToken::new())
        .await
        .unwrap()
}

fn assert_attempt_invariants(report: &InvestigationReport, max_retries: u32) {
    for step in &report.steps {
        let attempts: Vec<u32> = report
            .attempts_for(step.step_number)
            .iter()
            .map(|q| q.attempt)
            .collect();
        assert!(!attempts.is_empty());
        assert!(attempts.len() as u32 <= max_retries);
        assert_eq!(attempts, (1..=attempts.len() as u32).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_running_column_is_repaired_deterministically() {
    let h = harness(3);
    h.llm.add_responses([
        MockResponse::text(plan_reply(&["SELECT * FROM aws_ec2_instance WHERE running"])),
        MockResponse::text("Two instances are running."),
    ]);
    h.sandbox
        .add_output(steampipe_error("column \"running\" does not exist (SQLSTATE 42703)"));
    h.sandbox.add_stdout(r#"[{"instance_id": "i-1"}, {"instance_id": "i-2"}]"#);

    let report = run(&h, "Which EC2 instances are running?").await;

    let result = &report.results[0];
    assert!(result.success);
    assert_eq!(
        result.query,
        "SELECT * FROM aws_ec2_instance WHERE instance_state = 'running'"
    );

    let attempts = report.attempts_for(1);
    assert_eq!(attempts.len(), 2);
    assert!(attempts[0].error.as_deref().unwrap().contains("column \"running\""));
    assert_eq!(attempts[0].query, "SELECT * FROM aws_ec2_instance WHERE running");
    assert!(attempts[1].succeeded());

    // plan + analysis only: the rule fixed the query without the model
    assert_eq!(h.llm.request_count(), 2);
    assert_eq!(report.analysis, "Two instances are running.");
    assert_attempt_invariants(&report, 3);
}

#[tokio::test]
async fn test_single_attempt_budget_skips_repair() {
    let h = harness(1);
    h.llm.add_responses([
        MockResponse::text(plan_reply(&["SELECT * FROM aws_ec2_instance WHERE running"])),
        MockResponse::text("Nothing could be queried."),
    ]);
    h.sandbox
        .add_output(steampipe_error("column \"running\" does not exist"));

    let report = run(&h, "running instances").await;

    assert!(!report.results[0].success);
    assert_eq!(report.executed_queries.len(), 1);
    assert_eq!(h.sandbox.run_count(), 1);
    // plan + analysis, no repair call
    assert_eq!(h.llm.request_count(), 2);
    assert!(report.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("does not exist"));
}

#[tokio::test]
async fn test_steps_run_in_order_and_failures_do_not_abort() {
    let h = harness(2);
    h.llm.add_responses([
        MockResponse::text(plan_reply(&[
            "SELECT account_id FROM aws_account",
            "SELECT name FROM aws_s3_bucket",
            "SELECT name FROM aws_iam_user",
        ])),
        // repair for step 2
        MockResponse::text("SELECT name, region FROM aws_s3_bucket"),
        MockResponse::text("analysis"),
    ]);
    h.sandbox.add_stdout(r#"[{"account_id": "123"}]"#);
    h.sandbox.add_output(steampipe_error("permission denied for s3"));
    h.sandbox.add_output(steampipe_error("still denied"));
    h.sandbox.add_stdout(r#"[{"name": "alice"}]"#);

    let report = run(&h, "account overview").await;

    assert_eq!(report.steps.len(), 3);
    assert_eq!(
        report.results.iter().map(|r| r.success).collect::<Vec<_>>(),
        vec![true, false, true]
    );
    assert_eq!(report.results[1].query, "SELECT name, region FROM aws_s3_bucket");
    assert_eq!(
        report
            .executed_queries
            .iter()
            .map(|q| (q.step_number, q.attempt))
            .collect::<Vec<_>>(),
        vec![(1, 1), (2, 1), (2, 2), (3, 1)]
    );
    assert_attempt_invariants(&report, 2);

    let analysis_prompt = h.llm.requests()[2].last_user_message().unwrap().to_string();
    assert!(analysis_prompt.contains("Step 1: [{\"account_id\": \"123\"}]"));
    assert!(analysis_prompt.contains("Step 2 failed:"));
}

#[tokio::test]
async fn test_unparsable_plan_uses_catalogued_fallback() {
    let h = harness(3);
    h.llm.add_responses([
        MockResponse::text("I would start by looking at your buckets."),
        MockResponse::text("Buckets listed."),
    ]);
    h.sandbox.add_stdout("[]");

    let report = run(&h, "Are any S3 buckets public?").await;

    assert_eq!(report.steps, fallback_plan("Are any S3 buckets public?", CloudProvider::Aws));
    assert_eq!(report.steps.len(), 1);
    assert!(report.steps[0].query.contains("aws_s3_bucket"));
    assert!(report.results[0].success);
}

#[tokio::test]
async fn test_analysis_failure_degrades_to_placeholder() {
    let h = harness(3);
    h.llm.add_responses([
        MockResponse::text(plan_reply(&["SELECT account_id FROM aws_account"])),
        MockResponse::error(BackendError::TimeoutError { seconds: 60 }),
    ]);
    h.sandbox.add_stdout("[]");

    let report = run(&h, "who am I").await;
    assert_eq!(report.analysis, ANALYSIS_PLACEHOLDER);
    assert!(report.results[0].success);
}

#[tokio::test]
async fn test_total_degradation_still_returns_report() {
    let h = harness(3);
    h.llm.add_responses([
        MockResponse::error(BackendError::NetworkError {
            message: "offline".to_string(),
        }),
        // repair attempt
        MockResponse::error(BackendError::NetworkError {
            message: "offline".to_string(),
        }),
        MockResponse::error(BackendError::NetworkError {
            message: "offline".to_string(),
        }),
    ]);
    h.sandbox
        .add_error(SandboxError::Unavailable("docker not running".to_string()));

    let report = run(&h, "anything at all").await;

    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].query, "SELECT * FROM aws_account LIMIT 1");
    assert!(!report.results[0].success);
    assert_eq!(report.executed_queries.len(), 1);
    assert_eq!(report.analysis, ANALYSIS_PLACEHOLDER);
}

#[tokio::test]
async fn test_cancelled_sandbox_call_is_not_retried() {
    let h = harness(3);
    h.llm.add_responses([
        MockResponse::text(plan_reply(&["SELECT name FROM aws_s3_bucket"])),
        MockResponse::text("analysis"),
    ]);
    h.sandbox.add_error(SandboxError::Cancelled);

    let report = run(&h, "buckets").await;

    assert!(!report.results[0].success);
    assert_eq!(report.executed_queries.len(), 1);
    // plan + analysis: no repair for a cancelled attempt
    assert_eq!(h.llm.request_count(), 2);
}
