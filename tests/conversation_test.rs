//! Tool-use loop driven by scripted model replies

use shipwright::conversation::ToolUseAgent;
use shipwright::llm::{MessageRole, MockLLMClient, MockResponse};
use shipwright::sandbox::MockSandbox;
use shipwright::tools::ToolRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const STEAMPIPE_REQUEST: &str =
    r#"{"tool":"steampipe","action":"query","params":{"provider":"aws","sql":"SELECT 1"}}"#;

fn setup() -> (Arc<MockLLMClient>, Arc<MockSandbox>, ToolUseAgent) {
    let llm = Arc::new(MockLLMClient::new());
    let sandbox = Arc::new(MockSandbox::new());
    let registry = Arc::new(ToolRegistry::standard(sandbox.clone(), "us-east-1"));
    let agent = ToolUseAgent::new(llm.clone(), registry).with_max_turns(5);
    (llm, sandbox, agent)
}

#[tokio::test]
async fn test_tool_request_is_dispatched_and_fed_back() {
    let (llm, sandbox, agent) = setup();
    llm.add_responses([
        MockResponse::text(STEAMPIPE_REQUEST),
        MockResponse::text("The account responds to queries."),
    ]);
    sandbox.add_stdout(r#"[{"?column?": 1}]"#);

    let report = agent
        .investigate_with_tools("check connectivity", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.tools_used.len(), 1);
    let used = &report.tools_used[0];
    assert_eq!((used.tool.as_str(), used.action.as_str()), ("steampipe", "query"));
    assert!(!used.is_error());
    assert_eq!(sandbox.run_count(), 1);
    assert_eq!(report.analysis, "The account responds to queries.");

    let follow_up = llm.requests()[1].last_user_message().unwrap().to_string();
    assert!(follow_up.starts_with("Tool 'steampipe' executed successfully. Output:\n"));
    assert!(follow_up.contains(r#"[{"?column?": 1}]"#));
}

#[tokio::test]
async fn test_plain_reply_ends_on_first_turn() {
    let (llm, sandbox, agent) = setup();
    llm.add_response(MockResponse::text(
        "Here is my final analysis: nothing needs attention.",
    ));

    let report = agent
        .investigate_with_tools("quick look", &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.tools_used.is_empty());
    assert_eq!(report.turns, 1);
    assert_eq!(report.analysis, "Here is my final analysis: nothing needs attention.");
    assert_eq!(llm.request_count(), 1);
    assert_eq!(sandbox.run_count(), 0);

    let first = &llm.requests()[0];
    assert_eq!(first.messages[0].role, MessageRole::System);
    assert!(first
        .last_user_message()
        .unwrap()
        .starts_with("Task: quick look\n\nRespond with a JSON tool request"));
}

#[tokio::test]
async fn test_exhausted_turns_request_final_summary() {
    let (llm, sandbox, agent) = setup();
    for _ in 0..5 {
        llm.add_response(MockResponse::text(STEAMPIPE_REQUEST));
        sandbox.add_stdout("[]");
    }
    llm.add_response(MockResponse::text("Summary: five queries, no findings."));

    let report = agent
        .investigate_with_tools("keep digging", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.tools_used.len(), 5);
    assert_eq!(report.analysis, "Summary: five queries, no findings.");
    assert_eq!(report.turns, 6);
    assert_eq!(llm.request_count(), 6);
    assert_eq!(
        llm.requests()[5].last_user_message(),
        Some("Please provide a final summary of your investigation findings.")
    );
}

#[tokio::test]
async fn test_failed_tool_keeps_conversation_going() {
    let (llm, sandbox, agent) = setup();
    llm.add_responses([
        MockResponse::text(r#"{"tool":"trivy","action":"explode","params":{}}"#),
        MockResponse::text(STEAMPIPE_REQUEST),
        MockResponse::text("Done."),
    ]);
    sandbox.add_stdout("[]");

    let report = agent
        .investigate_with_tools("scan", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.tools_used.len(), 2);
    assert!(report.tools_used[0].is_error());
    assert!(!report.tools_used[1].is_error());
    // unknown action never reaches the sandbox
    assert_eq!(sandbox.run_count(), 1);

    let feedback = llm.requests()[1].last_user_message().unwrap().to_string();
    assert!(feedback.starts_with("Tool error:"));
    assert!(feedback.contains("explode"));
}
