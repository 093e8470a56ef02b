//! shipwright - containerized security tooling with an LLM-driven cloud investigator
//!
//! Infrastructure security tools run in disposable containers behind a
//! uniform [`tools::ToolAdapter`] interface. On top of that sit two
//! model-driven loops:
//!
//! - **Investigation** ([`investigation::InvestigationAgent`]): the model plans
//!   steampipe queries grounded in a per-provider table catalogue; failing
//!   queries are repaired from known error signatures or by the model, and
//!   retried within a bounded budget.
//! - **Tool use** ([`conversation::ToolUseAgent`]): the model requests tool runs
//!   as JSON, sees their output, and finishes with a plain-text analysis.
//!
//! # Example Usage
//!
//! ```ignore
//! use shipwright::cloud::CloudProvider;
//! use shipwright::investigation::InvestigationAgent;
//! use shipwright::tools::SteampipeRunner;
//! use shipwright::sandbox::DockerSandbox;
//! use std::sync::Arc;
//!
//! let sandbox = Arc::new(DockerSandbox::connect(timeout, true)?);
//! let runner = Arc::new(SteampipeRunner::new(sandbox, "us-east-1"));
//! let agent = InvestigationAgent::new(llm, runner);
//! let report = agent.investigate("find public S3 buckets", CloudProvider::Aws, &cancel).await?;
//! println!("{}", report.analysis);
//! ```

pub mod cli;
pub mod cloud;
pub mod config;
pub mod conversation;
pub mod investigation;
pub mod llm;
pub mod sandbox;
pub mod tools;
pub mod util;

pub use cloud::CloudProvider;
pub use config::{ConfigError, ShipwrightConfig};
pub use conversation::{AgentError, ToolInvestigationReport, ToolUseAgent};
pub use investigation::{InvestigationAgent, InvestigationError, InvestigationReport};
pub use llm::{BackendError, LLMClient};
pub use sandbox::{ExecSpec, Sandbox, SandboxError};
pub use tools::{ToolRegistry, ToolRequest, ToolResult};
pub use util::{init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
