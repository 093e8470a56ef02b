pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{
    AgentArgs, AuditArgs, CliArgs, Commands, ConfigArgs, CostArgs, HealthArgs, InvestigateArgs,
    LlmArgs, RunArgs, ToolsArgs,
};
pub use output::{HealthStatus, OutputFormat, OutputFormatter, ToolListing};
