//! Tool-use conversation loop over the [`ToolRegistry`](crate::tools::ToolRegistry)

mod agent;
mod reports;

pub use agent::{parse_tool_request, AgentError, ToolUseAgent};
pub use reports::{extract_recommendations, CostReport, SecurityAuditReport, ToolInvestigationReport};
