//! Turns an objective into an ordered list of steampipe queries
//!
//! The model only ever sees the catalogued tables for the target provider.
//! Whatever it returns is normalised (numbering, provider, step count); when
//! nothing usable comes back a single canned step is produced instead.

use super::extract::extract_json_array;
use super::schema::{default_table, fallback_rules, SchemaHints};
use super::types::{InvestigationError, InvestigationStep, RawStep};
use crate::cloud::CloudProvider;
use crate::llm::{complete, LLMClient};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const MIN_STEPS: usize = 3;
pub const MAX_STEPS: usize = 5;

const PLANNER_SYSTEM_PROMPT: &str =
    "You are a cloud infrastructure expert. Always respond with valid JSON arrays when asked for investigation plans.";

fn build_prompt(objective: &str, hints: &SchemaHints) -> String {
    let examples = hints
        .examples
        .iter()
        .map(|(description, query)| format!("- {}: {}", description, query))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Create an investigation plan for the following objective.

Objective: {objective}
Provider: {provider}

Available tables:
{tables}

Example queries:
{examples}

Return a JSON array of investigation steps, each with:
- "step_number": sequential number
- "description": what this step investigates
- "provider": "{provider}"
- "query": the Steampipe SQL query to run
- "expected_insights": what we hope to learn

Rules:
- Generate exactly {min}-{max} steps that thoroughly investigate the objective.
- NEVER use made-up table names. Only use the tables listed above.
- Use only columns shown in the example queries when unsure.
- Return only the JSON array.
"#,
        objective = objective,
        provider = hints.provider,
        tables = hints.tables.join(", "),
        examples = examples,
        min = MIN_STEPS,
        max = MAX_STEPS,
    )
}

/// Deterministic single step for when planning produced nothing usable.
///
/// Only tables from the provider's catalogue are ever referenced.
pub fn fallback_plan(objective: &str, provider: CloudProvider) -> Vec<InvestigationStep> {
    let lower = objective.to_lowercase();
    let step = match fallback_rules(provider)
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| lower.contains(k)))
    {
        Some(rule) => InvestigationStep::new(
            1,
            provider,
            rule.description,
            rule.query,
            rule.expected_insights,
        ),
        None => {
            let table = default_table(provider);
            InvestigationStep::new(
                1,
                provider,
                format!("Basic {} connectivity check", provider.display_name()),
                format!("SELECT * FROM {} LIMIT 1", table),
                "Confirms access to the account",
            )
        }
    };
    vec![step]
}

/// Parses a model reply into normalised steps.
///
/// `None` when no array can be located or it contains no step with a query.
pub fn parse_plan(reply: &str, provider: CloudProvider) -> Option<Vec<InvestigationStep>> {
    let array = extract_json_array(reply)?;
    let raw: Vec<RawStep> = match serde_json::from_str(array) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "Plan array did not deserialize");
            return None;
        }
    };

    let steps: Vec<InvestigationStep> = raw
        .into_iter()
        .filter_map(|raw| {
            let query = raw.query.map(|q| q.trim().to_string()).filter(|q| !q.is_empty())?;
            if let Some(p) = raw.provider.as_deref() {
                if !p.eq_ignore_ascii_case(provider.as_str()) {
                    debug!(step_provider = p, provider = %provider, "Overriding step provider");
                }
            }
            Some((raw.description, query, raw.expected_insights))
        })
        .take(MAX_STEPS)
        .enumerate()
        .map(|(index, (description, query, insights))| {
            InvestigationStep::new(
                index as u32 + 1,
                provider,
                description.unwrap_or_else(|| format!("Step {}", index + 1)),
                query,
                insights.unwrap_or_default(),
            )
        })
        .collect();

    (!steps.is_empty()).then_some(steps)
}

pub struct QueryPlanner {
    llm: Arc<dyn LLMClient>,
}

impl QueryPlanner {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    /// Produces the plan for `objective`.
    ///
    /// Model and parse failures fall back to [`fallback_plan`]; only
    /// cancellation is returned as an error.
    pub async fn plan(
        &self,
        objective: &str,
        hints: &SchemaHints,
        cancel: &CancellationToken,
    ) -> Result<Vec<InvestigationStep>, InvestigationError> {
        let provider = hints.provider;
        let prompt = build_prompt(objective, hints);

        let reply = match complete(self.llm.as_ref(), Some(PLANNER_SYSTEM_PROMPT), &prompt, cancel).await {
            Ok(reply) => reply,
            Err(e) if e.is_cancelled() => return Err(InvestigationError::Cancelled),
            Err(e) => {
                warn!(error = %e, "Plan generation failed, using fallback plan");
                return Ok(fallback_plan(objective, provider));
            }
        };

        let Some(steps) = parse_plan(&reply, provider) else {
            warn!("Could not parse investigation plan, using fallback plan");
            return Ok(fallback_plan(objective, provider));
        };

        if steps.len() < MIN_STEPS {
            warn!(steps = steps.len(), "Plan has fewer steps than requested");
        }
        for step in &steps {
            let unknown = hints.unknown_tables(&step.query);
            if !unknown.is_empty() {
                warn!(
                    step = step.step_number,
                    tables = ?unknown,
                    "Plan references tables outside the catalogue"
                );
            }
        }

        info!(provider = %provider, steps = steps.len(), "Investigation plan ready");
        Ok(steps)
    }
}
