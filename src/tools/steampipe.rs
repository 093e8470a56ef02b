//! Cloud inventory queries through steampipe
//!
//! Each query runs in a fresh `turbot/steampipe` container: the provider
//! plugin is installed, AWS gets a connection pinned to a single region, and
//! the query is executed with all output folded onto stdout so that the
//! failure markers below can be detected.

use super::credentials::{provider_credentials, Credentials};
use super::error::ToolError;
use super::request::{Params, ToolInvocation, ToolKind};
use super::trait_def::ToolAdapter;
use crate::cloud::CloudProvider;
use crate::sandbox::{ExecSpec, Sandbox, SandboxError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const STEAMPIPE_IMAGE: &str = "turbot/steampipe:latest";

const EXIT_MARKER: &str = "EXIT_CODE:";
const ERROR_MARKER: &str = "Error:";
const AWS_CONNECTION_ENV: &str = "SHIPWRIGHT_AWS_CONNECTION";
const GCP_CREDENTIALS_MOUNT: &str = "/home/steampipe/.config/gcloud/application_default_credentials.json";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("steampipe query failed: {0}")]
    Failed(String),

    #[error("Query is empty")]
    Empty,

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl QueryError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryError::Sandbox(e) if e.is_cancelled())
    }
}

#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn run_query(
        &self,
        provider: CloudProvider,
        query: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<String, QueryError>;
}

/// Keeps only the first statement when several are chained with `;`.
/// A lone trailing `;` is left in place.
pub fn first_statement(query: &str) -> &str {
    let trimmed = query.trim();
    let statements = trimmed.split(';').filter(|s| !s.trim().is_empty()).count();
    if statements > 1 {
        warn!(statements, "Multiple SQL statements detected, executing only the first");
        trimmed.split(';').next().unwrap_or(trimmed).trim()
    } else {
        trimmed
    }
}

/// Quotes `value` for a single-quoted `sh -c` context.
pub fn shell_escape_single_quoted(value: &str) -> String {
    value.replace('\'', r#"'"'"'"#)
}

pub fn aws_connection_config(region: &str) -> String {
    format!(
        "connection \"aws\" {{\n  plugin = \"aws\"\n  regions = [\"{}\"]\n}}\n",
        region
    )
}

pub struct SteampipeRunner {
    sandbox: Arc<dyn Sandbox>,
    default_region: String,
}

impl SteampipeRunner {
    pub fn new(sandbox: Arc<dyn Sandbox>, default_region: impl Into<String>) -> Self {
        Self {
            sandbox,
            default_region: default_region.into(),
        }
    }

    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    fn build_spec(&self, provider: CloudProvider, query: &str, credentials: &Credentials) -> ExecSpec {
        let mut script = format!(
            "steampipe plugin install {} >/dev/null 2>&1; ",
            provider.plugin()
        );
        let mut spec = ExecSpec::new(STEAMPIPE_IMAGE, "sh").accept_any_exit(true);

        for (key, value) in credentials.iter().filter(|(_, v)| !v.is_empty()) {
            spec = spec.env(key.clone(), value.clone());
        }

        match provider {
            CloudProvider::Aws => {
                let region = credentials
                    .get("AWS_REGION")
                    .filter(|r| !r.is_empty())
                    .map(String::as_str)
                    .unwrap_or(&self.default_region);
                spec = spec.env(AWS_CONNECTION_ENV, aws_connection_config(region));
                script.push_str(&format!(
                    "mkdir -p ~/.steampipe/config && printf '%s' \"${}\" > ~/.steampipe/config/aws.spc; ",
                    AWS_CONNECTION_ENV
                ));
            }
            CloudProvider::Gcp => {
                if let Some(host_path) = credentials.get("GOOGLE_APPLICATION_CREDENTIALS") {
                    spec = spec
                        .host_file(host_path.clone(), GCP_CREDENTIALS_MOUNT)
                        .env("GOOGLE_APPLICATION_CREDENTIALS", GCP_CREDENTIALS_MOUNT);
                }
            }
            CloudProvider::Azure => {}
        }

        script.push_str(&format!(
            "steampipe query '{}' --output json 2>&1 || echo '{}'$?",
            shell_escape_single_quoted(query),
            EXIT_MARKER
        ));

        spec.arg("-c").arg(script)
    }
}

#[async_trait]
impl QueryRunner for SteampipeRunner {
    async fn run_query(
        &self,
        provider: CloudProvider,
        query: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<String, QueryError> {
        let statement = first_statement(query);
        if statement.is_empty() {
            return Err(QueryError::Empty);
        }

        debug!(provider = %provider, query = statement, "Running steampipe query");
        let spec = self.build_spec(provider, statement, credentials);
        let output = self.sandbox.run(&spec, cancel).await?;

        let stdout = output.stdout;
        if stdout.contains(EXIT_MARKER) || stdout.contains(ERROR_MARKER) {
            return Err(QueryError::Failed(stdout.trim().to_string()));
        }

        Ok(stdout)
    }
}

/// `steampipe` entry of the tool registry.
pub struct SteampipeTool {
    runner: Arc<dyn QueryRunner>,
    default_region: String,
}

impl SteampipeTool {
    pub fn new(runner: Arc<dyn QueryRunner>, default_region: impl Into<String>) -> Self {
        Self {
            runner,
            default_region: default_region.into(),
        }
    }
}

#[async_trait]
impl ToolAdapter for SteampipeTool {
    fn name(&self) -> &'static str {
        ToolKind::Steampipe.as_str()
    }

    fn description(&self) -> &'static str {
        ToolKind::Steampipe.description()
    }

    fn actions(&self) -> Vec<&'static str> {
        ToolKind::Steampipe.actions().iter().map(|a| a.name).collect()
    }

    fn usage(&self) -> Vec<&'static str> {
        ToolKind::Steampipe.actions().iter().map(|a| a.usage).collect()
    }

    async fn invoke(
        &self,
        action: &str,
        params: &Params,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        match ToolInvocation::parse(self.name(), action, params)? {
            ToolInvocation::SteampipeQuery { provider, sql } => {
                let credentials = provider_credentials(provider, &self.default_region);
                Ok(self
                    .runner
                    .run_query(provider, &sql, &credentials, cancel)
                    .await?)
            }
            _ => Err(ToolError::UnknownAction {
                tool: self.name().to_string(),
                action: action.to_string(),
            }),
        }
    }
}
