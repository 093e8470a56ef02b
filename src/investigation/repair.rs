//! Query repair after a failed steampipe run
//!
//! Known schema mismatches are rewritten from a static signature table.
//! Anything else is handed to the model with a short column cheat sheet.

use super::extract::strip_code_fences;
use crate::cloud::CloudProvider;
use crate::llm::{complete, BackendError, LLMClient};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One known error signature and its textual fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairRule {
    pub name: &'static str,
    /// Every fragment must appear in the error message.
    pub error_contains: &'static [&'static str],
    /// Fragment the query must contain, if any.
    pub query_contains: Option<&'static str>,
    /// Applied in order with plain substring replacement.
    pub replacements: &'static [(&'static str, &'static str)],
}

impl RepairRule {
    fn matches(&self, query: &str, error: &str) -> bool {
        self.error_contains.iter().all(|fragment| error.contains(fragment))
            && self.query_contains.map_or(true, |q| query.contains(q))
    }

    fn apply(&self, query: &str) -> String {
        self.replacements
            .iter()
            .fold(query.to_string(), |acc, (from, to)| acc.replace(from, to))
    }
}

const AWS_RULES: &[RepairRule] = &[
    RepairRule {
        name: "running-predicate",
        error_contains: &["column \"running\" does not exist"],
        query_contains: None,
        replacements: &[("WHERE running", "WHERE instance_state = 'running'")],
    },
    RepairRule {
        name: "state-name-column",
        error_contains: &["column \"state_name\" does not exist"],
        query_contains: None,
        replacements: &[("state_name", "instance_state")],
    },
    RepairRule {
        name: "ec2-state-column",
        error_contains: &["column \"state\" does not exist"],
        query_contains: Some("aws_ec2_instance"),
        replacements: &[(" state", " instance_state")],
    },
    RepairRule {
        name: "security-group-fields",
        error_contains: &["sg.group_id"],
        query_contains: None,
        replacements: &[
            ("sg.group_id", "sg->>'GroupId'"),
            ("sg.group_name", "sg->>'GroupName'"),
        ],
    },
];

// Extension points: no signatures catalogued yet.
const AZURE_RULES: &[RepairRule] = &[];
const GCP_RULES: &[RepairRule] = &[];

pub fn repair_rules(provider: CloudProvider) -> &'static [RepairRule] {
    match provider {
        CloudProvider::Aws => AWS_RULES,
        CloudProvider::Azure => AZURE_RULES,
        CloudProvider::Gcp => GCP_RULES,
    }
}

/// Rewrites `query` using the first rule whose signature matches `error`.
///
/// Pure: `None` when no rule matches or the matching rule would leave the
/// query unchanged.
pub fn deterministic_repair(provider: CloudProvider, query: &str, error: &str) -> Option<String> {
    repair_rules(provider)
        .iter()
        .filter(|rule| rule.matches(query, error))
        .find_map(|rule| {
            let fixed = rule.apply(query);
            if fixed == query {
                return None;
            }
            debug!(rule = rule.name, "Deterministic repair applied");
            Some(fixed)
        })
}

fn cheat_sheet(provider: CloudProvider) -> &'static str {
    match provider {
        CloudProvider::Aws => {
            "- For AWS EC2, use 'instance_state' not 'state' or 'state_name'
- For running instances use: WHERE instance_state = 'running'
- For security groups in EC2, use jsonb_array_elements like: jsonb_array_elements(security_groups) as sg
- Then access fields like: sg->>'GroupId'"
        }
        CloudProvider::Azure => "- Azure tables expose 'name', 'location' and 'resource_group' on most resources",
        CloudProvider::Gcp => "- GCP tables expose 'name', 'location' and 'project' on most resources",
    }
}

fn build_prompt(provider: CloudProvider, query: &str, error: &str) -> String {
    format!(
        r#"The following Steampipe query failed with an error. Please provide a corrected version.

Original Query:
{query}

Error:
{error}

Important:
{hints}

Provide ONLY the corrected SQL query, no explanation.
"#,
        query = query,
        error = error,
        hints = cheat_sheet(provider),
    )
}

/// Asks the model for a corrected query.
///
/// `Ok(None)` when the reply is empty after fence stripping; call errors,
/// including cancellation, are returned to the caller.
pub async fn llm_repair(
    llm: &dyn LLMClient,
    provider: CloudProvider,
    query: &str,
    error: &str,
    cancel: &CancellationToken,
) -> Result<Option<String>, BackendError> {
    let reply = complete(llm, None, &build_prompt(provider, query, error), cancel).await?;
    let fixed = strip_code_fences(&reply);
    Ok((!fixed.is_empty()).then_some(fixed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLLMClient, MockResponse};
    use yare::parameterized;

    #[parameterized(
        running = {
            "SELECT * FROM aws_ec2_instance WHERE running",
            "ERROR: column \"running\" does not exist (SQLSTATE 42703)",
            "SELECT * FROM aws_ec2_instance WHERE instance_state = 'running'"
        },
        state_name = {
            "SELECT instance_id, state_name FROM aws_ec2_instance",
            "column \"state_name\" does not exist",
            "SELECT instance_id, instance_state FROM aws_ec2_instance"
        },
        ec2_state = {
            "SELECT instance_id, state FROM aws_ec2_instance",
            "column \"state\" does not exist",
            "SELECT instance_id, instance_state FROM aws_ec2_instance"
        },
        security_groups = {
            "SELECT sg.group_id, sg.group_name FROM aws_ec2_instance i, jsonb_array_elements(i.security_groups) sg",
            "column sg.group_id does not exist",
            "SELECT sg->>'GroupId', sg->>'GroupName' FROM aws_ec2_instance i, jsonb_array_elements(i.security_groups) sg"
        },
    )]
    fn test_deterministic_repair(query: &str, error: &str, expected: &str) {
        assert_eq!(
            deterministic_repair(CloudProvider::Aws, query, error).as_deref(),
            Some(expected)
        );
    }

    #[parameterized(
        unknown_error = { "SELECT 1", "permission denied" },
        state_on_other_table = { "SELECT state FROM aws_ebs_volume", "column \"state\" does not exist" },
        no_change = { "SELECT 1 FROM aws_ec2_instance", "column \"running\" does not exist" },
    )]
    fn test_deterministic_repair_no_match(query: &str, error: &str) {
        assert_eq!(deterministic_repair(CloudProvider::Aws, query, error), None);
    }

    #[test]
    fn test_deterministic_repair_is_pure() {
        let query = "SELECT * FROM aws_ec2_instance WHERE running";
        let error = "column \"running\" does not exist";
        assert_eq!(
            deterministic_repair(CloudProvider::Aws, query, error),
            deterministic_repair(CloudProvider::Aws, query, error)
        );
    }

    #[test]
    fn test_other_providers_have_no_rules() {
        assert!(repair_rules(CloudProvider::Azure).is_empty());
        assert_eq!(
            deterministic_repair(
                CloudProvider::Gcp,
                "SELECT * FROM gcp_compute_instance WHERE running",
                "column \"running\" does not exist"
            ),
            None
        );
    }

    #[tokio::test]
    async fn test_llm_repair_strips_fences() {
        let client = MockLLMClient::new();
        client.add_response(MockResponse::text("```sql\nSELECT name FROM aws_s3_bucket\n```"));

        let fixed = llm_repair(
            &client,
            CloudProvider::Aws,
            "SELECT nme FROM aws_s3_bucket",
            "column \"nme\" does not exist",
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(fixed.as_deref(), Some("SELECT name FROM aws_s3_bucket"));

        let prompt = client.requests()[0].last_user_message().unwrap().to_string();
        assert!(prompt.contains("SELECT nme FROM aws_s3_bucket"));
        assert!(prompt.contains("Provide ONLY the corrected SQL query"));
    }

    #[tokio::test]
    async fn test_llm_repair_empty_reply() {
        let client = MockLLMClient::new();
        client.add_response(MockResponse::text("```\n```"));

        let fixed = llm_repair(&client, CloudProvider::Aws, "q", "e", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fixed, None);
    }
}
