//! LLM-driven cloud inventory investigation
//!
//! [`QueryPlanner`] turns an objective into steampipe queries grounded in
//! the [`schema`] catalogue, and [`InvestigationAgent`] executes them with
//! bounded retries and query repair before asking the model for a summary.

pub mod agent;
pub mod analysis;
pub mod extract;
pub mod planner;
pub mod repair;
pub mod schema;
mod types;

pub use agent::InvestigationAgent;
pub use analysis::{build_analysis_prompt, ResultDigest, ANALYSIS_PLACEHOLDER};
pub use extract::{extract_json_array, extract_json_object, strip_code_fences};
pub use planner::{fallback_plan, parse_plan, QueryPlanner, MAX_STEPS, MIN_STEPS};
pub use repair::{deterministic_repair, llm_repair, repair_rules, RepairRule};
pub use schema::{default_table, FallbackRule, SchemaHints};
pub use types::{
    ExecutedQuery, InvestigationError, InvestigationReport, InvestigationStep, StepResult,
};
