//! Multi-turn tool use
//!
//! Each model reply is either a JSON tool request, which is dispatched and
//! its result fed back, or plain text, which ends the conversation as the
//! final analysis. After `max_turns` tool requests the model is asked for
//! a closing summary.

use super::reports::{
    extract_recommendations, CostReport, SecurityAuditReport, ToolInvestigationReport,
};
use crate::cloud::CloudProvider;
use crate::config::DEFAULT_MAX_TOOL_TURNS;
use crate::investigation::extract_json_object;
use crate::llm::{chat_cancellable, BackendError, ChatMessage, LLMClient, LLMRequest};
use crate::tools::{ToolRegistry, ToolRequest, ToolResult};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const SYSTEM_PREAMBLE: &str = "You are an infrastructure investigator with access to real tools. Always respond with JSON when using tools, never with explanatory text.";

const JSON_ONLY_INSTRUCTIONS: &str = r#"IMPORTANT: When you want to use a tool, you MUST respond with ONLY a valid JSON object. Do not include any text before or after the JSON.
Example correct response:
{"tool": "steampipe", "action": "query", "params": {"provider": "aws", "sql": "SELECT count(*) FROM aws_s3_bucket"}}

After I execute the tool and return results, you can then use another tool or provide your final analysis.
DO NOT describe your plan - just execute it by returning JSON tool requests."#;

const FINAL_SUMMARY_PROMPT: &str = "Please provide a final summary of your investigation findings.";

/// Tool output beyond this many characters is cut before it is sent back.
const MAX_FEEDBACK_CHARS: usize = 16_000;

#[derive(Debug, Error, PartialEq)]
pub enum AgentError {
    #[error("Objective is empty")]
    EmptyObjective,

    #[error("LLM call failed: {0}")]
    Llm(#[from] BackendError),
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Llm(e) if e.is_cancelled())
    }
}

/// Parses a reply as a tool request; `None` means it is a final answer.
pub fn parse_tool_request(reply: &str) -> Option<ToolRequest> {
    let candidate = extract_json_object(reply)?;
    let request: ToolRequest = serde_json::from_str(candidate).ok()?;
    (!request.tool.trim().is_empty()).then_some(request)
}

fn truncate(output: &str) -> String {
    match output.char_indices().nth(MAX_FEEDBACK_CHARS) {
        Some((cut, _)) => format!("{}\n[output truncated]", &output[..cut]),
        None => output.to_string(),
    }
}

fn feedback(result: &ToolResult) -> String {
    match &result.error {
        Some(error) => format!(
            "Tool error: {}\n\nTry another tool or provide your analysis.",
            error
        ),
        None => format!(
            "Tool '{}' executed successfully. Output:\n{}\n\nRespond with another JSON tool request to continue, or provide your final analysis as plain text.",
            result.tool,
            truncate(&result.output)
        ),
    }
}

pub struct ToolUseAgent {
    llm: Arc<dyn LLMClient>,
    registry: Arc<ToolRegistry>,
    max_turns: usize,
}

impl ToolUseAgent {
    pub fn new(llm: Arc<dyn LLMClient>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            llm,
            registry,
            max_turns: DEFAULT_MAX_TOOL_TURNS,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "{} {}\n{}",
            SYSTEM_PREAMBLE,
            self.registry.describe(),
            JSON_ONLY_INSTRUCTIONS
        )
    }

    async fn next_reply(
        &self,
        messages: &mut Vec<ChatMessage>,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let reply = chat_cancellable(self.llm.as_ref(), LLMRequest::new(messages.clone()), cancel).await?;
        messages.push(ChatMessage::assistant(reply.clone()));
        Ok(reply)
    }

    pub async fn investigate_with_tools(
        &self,
        objective: &str,
        cancel: &CancellationToken,
    ) -> Result<ToolInvestigationReport, AgentError> {
        let objective = objective.trim();
        if objective.is_empty() {
            return Err(AgentError::EmptyObjective);
        }

        let mut messages = vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(format!(
                "Task: {}\n\nRespond with a JSON tool request to begin investigation. Do not explain, just return JSON.",
                objective
            )),
        ];
        let mut tools_used = Vec::new();

        for turn in 1..=self.max_turns {
            let reply = self.next_reply(&mut messages, cancel).await?;
            debug!(turn, reply_len = reply.len(), "LLM response");

            let Some(request) = parse_tool_request(&reply) else {
                info!(turn, tools = tools_used.len(), "Final analysis received");
                return Ok(ToolInvestigationReport {
                    objective: objective.to_string(),
                    tools_used,
                    analysis: reply,
                    turns: turn,
                });
            };

            let result = self.registry.dispatch(&request, cancel).await;
            messages.push(ChatMessage::user(feedback(&result)));
            tools_used.push(result);
        }

        info!(turns = self.max_turns, "Turn budget exhausted, requesting summary");
        messages.push(ChatMessage::user(FINAL_SUMMARY_PROMPT));
        let analysis = self.next_reply(&mut messages, cancel).await?;

        Ok(ToolInvestigationReport {
            objective: objective.to_string(),
            tools_used,
            analysis,
            turns: self.max_turns + 1,
        })
    }

    /// `timestamp` is stamped on the report verbatim.
    pub async fn security_audit(
        &self,
        provider: CloudProvider,
        timestamp: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<SecurityAuditReport, AgentError> {
        let objective = format!(
            r#"Perform a comprehensive security audit of {} infrastructure:
1. Use Steampipe to find publicly accessible resources
2. Check for unencrypted storage
3. Identify overly permissive security groups
4. Analyze any Terraform code for security issues
5. Provide prioritized recommendations"#,
            provider.display_name()
        );

        let report = self.investigate_with_tools(&objective, cancel).await?;
        Ok(SecurityAuditReport {
            provider,
            tools_executed: report.tools_used.len(),
            findings: report.analysis,
            timestamp: timestamp.into(),
        })
    }

    pub async fn cost_optimization(
        &self,
        plan_path: &str,
        cancel: &CancellationToken,
    ) -> Result<CostReport, AgentError> {
        let objective = format!(
            r#"Analyze infrastructure costs and provide optimization recommendations:
1. Use OpenInfraQuote to analyze the Terraform plan at {}
2. Query current resource utilization with Steampipe
3. Identify unused or underutilized resources
4. Suggest cost-saving changes with specific Terraform code"#,
            plan_path
        );

        let report = self.investigate_with_tools(&objective, cancel).await?;
        Ok(CostReport {
            plan_file: plan_path.to_string(),
            recommendations: extract_recommendations(&report.analysis),
            tools_used: report.tools_used.len(),
            analysis: report.analysis,
        })
    }
}
