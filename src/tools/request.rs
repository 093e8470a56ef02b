//! Tool requests as emitted by the model, and their validated form
//!
//! The model speaks loosely typed JSON (`{"tool", "action", "params"}`).
//! [`ToolInvocation`] is the checked counterpart: one variant per
//! tool × action pair, with required parameters already extracted, so an
//! invalid combination is rejected before anything runs.

use super::error::ToolError;
use crate::cloud::CloudProvider;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type Params = BTreeMap<String, String>;

/// Parameters accept any JSON scalar; non-strings are stringified.
fn lenient_params<'de, D>(deserializer: D) -> Result<Params, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((k, s)),
            other => Some((k, other.to_string())),
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub action: String,
    #[serde(default, deserialize_with = "lenient_params")]
    pub params: Params,
}

impl ToolRequest {
    pub fn new(tool: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            action: action.into(),
            params: Params::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn from_json(text: &str) -> Result<Self, ToolError> {
        serde_json::from_str(text).map_err(|e| ToolError::MalformedRequest(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub action: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(request: &ToolRequest, output: impl Into<String>) -> Self {
        Self {
            tool: request.tool.clone(),
            action: request.action.clone(),
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(request: &ToolRequest, error: &ToolError) -> Self {
        Self {
            tool: request.tool.clone(),
            action: request.action.clone(),
            output: String::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionInfo {
    pub name: &'static str,
    /// Example request shown to the model
    pub usage: &'static str,
}

/// Every tool the registry knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Steampipe,
    Gitleaks,
    Trivy,
    Checkov,
    Tflint,
    TerraformDocs,
    Infracost,
    Inframap,
    OpenInfraQuote,
}

impl ToolKind {
    pub const ALL: [ToolKind; 9] = [
        ToolKind::Steampipe,
        ToolKind::Gitleaks,
        ToolKind::Trivy,
        ToolKind::Checkov,
        ToolKind::Tflint,
        ToolKind::TerraformDocs,
        ToolKind::Infracost,
        ToolKind::Inframap,
        ToolKind::OpenInfraQuote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Steampipe => "steampipe",
            ToolKind::Gitleaks => "gitleaks",
            ToolKind::Trivy => "trivy",
            ToolKind::Checkov => "checkov",
            ToolKind::Tflint => "tflint",
            ToolKind::TerraformDocs => "terraform-docs",
            ToolKind::Infracost => "infracost",
            ToolKind::Inframap => "inframap",
            ToolKind::OpenInfraQuote => "openinfraquote",
        }
    }

    pub fn parse(name: &str) -> Result<Self, ToolError> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::Steampipe => {
                "Execute SQL queries against live AWS/Azure/GCP inventory (information_schema.columns lists table columns)"
            }
            ToolKind::Gitleaks => "Detect hardcoded secrets in a directory or git history",
            ToolKind::Trivy => "Scan filesystems, container images or IaC config for HIGH/CRITICAL issues",
            ToolKind::Checkov => "Scan infrastructure code for security misconfigurations",
            ToolKind::Tflint => "Lint Terraform code",
            ToolKind::TerraformDocs => "Generate documentation for a Terraform module",
            ToolKind::Infracost => "Estimate costs for Terraform code",
            ToolKind::Inframap => "Generate infrastructure diagrams from Terraform state or HCL",
            ToolKind::OpenInfraQuote => "Analyze the cost of a Terraform plan",
        }
    }

    pub fn actions(&self) -> &'static [ActionInfo] {
        match self {
            ToolKind::Steampipe => &[ActionInfo {
                name: "query",
                usage: r#"{"tool": "steampipe", "action": "query", "params": {"provider": "aws", "sql": "SELECT count(*) FROM aws_s3_bucket"}}"#,
            }],
            ToolKind::Gitleaks => &[
                ActionInfo {
                    name: "dir",
                    usage: r#"{"tool": "gitleaks", "action": "dir", "params": {"path": "."}}"#,
                },
                ActionInfo {
                    name: "git",
                    usage: r#"{"tool": "gitleaks", "action": "git", "params": {"path": "."}}"#,
                },
            ],
            ToolKind::Trivy => &[
                ActionInfo {
                    name: "fs",
                    usage: r#"{"tool": "trivy", "action": "fs", "params": {"path": "."}}"#,
                },
                ActionInfo {
                    name: "image",
                    usage: r#"{"tool": "trivy", "action": "image", "params": {"image": "nginx:latest"}}"#,
                },
                ActionInfo {
                    name: "config",
                    usage: r#"{"tool": "trivy", "action": "config", "params": {"path": "."}}"#,
                },
            ],
            ToolKind::Checkov => &[ActionInfo {
                name: "scan",
                usage: r#"{"tool": "checkov", "action": "scan", "params": {"path": "path/to/code"}}"#,
            }],
            ToolKind::Tflint => &[ActionInfo {
                name: "lint",
                usage: r#"{"tool": "tflint", "action": "lint", "params": {"path": "."}}"#,
            }],
            ToolKind::TerraformDocs => &[ActionInfo {
                name: "generate",
                usage: r#"{"tool": "terraform-docs", "action": "generate", "params": {"path": "path/to/module"}}"#,
            }],
            ToolKind::Infracost => &[ActionInfo {
                name: "breakdown",
                usage: r#"{"tool": "infracost", "action": "breakdown", "params": {"path": "."}}"#,
            }],
            ToolKind::Inframap => &[
                ActionInfo {
                    name: "diagram",
                    usage: r#"{"tool": "inframap", "action": "diagram", "params": {"input": "terraform.tfstate", "format": "png"}}"#,
                },
                ActionInfo {
                    name: "diagram-hcl",
                    usage: r#"{"tool": "inframap", "action": "diagram-hcl", "params": {"path": ".", "format": "svg"}}"#,
                },
            ],
            ToolKind::OpenInfraQuote => &[ActionInfo {
                name: "analyze",
                usage: r#"{"tool": "openinfraquote", "action": "analyze", "params": {"file": "path/to/tfplan.json", "region": "us-east-1"}}"#,
            }],
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagramFormat {
    Png,
    Svg,
    Pdf,
    Dot,
}

impl DiagramFormat {
    fn parse(value: Option<&str>) -> Result<Self, ToolError> {
        match value.map(|v| v.to_lowercase()).as_deref() {
            None | Some("png") => Ok(DiagramFormat::Png),
            Some("svg") => Ok(DiagramFormat::Svg),
            Some("pdf") => Ok(DiagramFormat::Pdf),
            Some("dot") => Ok(DiagramFormat::Dot),
            Some(other) => Err(ToolError::InvalidParam {
                param: "format".to_string(),
                message: format!("unsupported format: {} (supported: png, svg, pdf, dot)", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocsFormat {
    Markdown,
    Json,
}

/// A request whose tool, action and required parameters have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    SteampipeQuery { provider: CloudProvider, sql: String },
    GitleaksDir { path: String },
    GitleaksGit { path: String },
    TrivyFs { path: String },
    TrivyImage { image: String },
    TrivyConfig { path: String },
    CheckovScan { path: String, framework: String },
    TflintLint { path: String },
    TerraformDocsGenerate { path: String, format: DocsFormat },
    InfracostBreakdown { path: String },
    InframapDiagram { input: String, format: DiagramFormat },
    InframapDiagramHcl { path: String, format: DiagramFormat },
    OpenInfraQuoteAnalyze { file: String, region: Option<String> },
}

struct ParamReader<'a> {
    tool: ToolKind,
    action: &'a str,
    params: &'a Params,
}

impl<'a> ParamReader<'a> {
    fn optional(&self, key: &str) -> Option<&'a str> {
        self.params
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ToolError> {
        self.optional(key)
            .map(str::to_string)
            .ok_or_else(|| ToolError::MissingParam {
                tool: self.tool.as_str().to_string(),
                action: self.action.to_string(),
                param: key.to_string(),
            })
    }

    fn path_or_cwd(&self) -> String {
        self.optional("path").unwrap_or(".").to_string()
    }
}

impl ToolInvocation {
    pub fn parse(tool: &str, action: &str, params: &Params) -> Result<Self, ToolError> {
        let kind = ToolKind::parse(tool)?;
        let action = action.trim();
        let p = ParamReader {
            tool: kind,
            action,
            params,
        };

        let invocation = match (kind, action) {
            (ToolKind::Steampipe, "query") => {
                let provider = p
                    .optional("provider")
                    .unwrap_or("aws")
                    .parse::<CloudProvider>()
                    .map_err(|e| ToolError::InvalidParam {
                        param: "provider".to_string(),
                        message: e.to_string(),
                    })?;
                let sql = match p.optional("sql") {
                    Some(sql) => sql.to_string(),
                    None => p.required("query")?,
                };
                ToolInvocation::SteampipeQuery { provider, sql }
            }
            (ToolKind::Gitleaks, "dir") => ToolInvocation::GitleaksDir {
                path: p.path_or_cwd(),
            },
            (ToolKind::Gitleaks, "git") => ToolInvocation::GitleaksGit {
                path: p.path_or_cwd(),
            },
            (ToolKind::Trivy, "fs") => ToolInvocation::TrivyFs {
                path: p.path_or_cwd(),
            },
            (ToolKind::Trivy, "image") => ToolInvocation::TrivyImage {
                image: p.required("image")?,
            },
            (ToolKind::Trivy, "config") => ToolInvocation::TrivyConfig {
                path: p.path_or_cwd(),
            },
            (ToolKind::Checkov, "scan") => ToolInvocation::CheckovScan {
                path: p.path_or_cwd(),
                framework: p.optional("framework").unwrap_or("terraform").to_string(),
            },
            (ToolKind::Tflint, "lint") => ToolInvocation::TflintLint {
                path: p.path_or_cwd(),
            },
            (ToolKind::TerraformDocs, "generate") => ToolInvocation::TerraformDocsGenerate {
                path: p.path_or_cwd(),
                format: match p.optional("format") {
                    Some(f) if f.eq_ignore_ascii_case("json") => DocsFormat::Json,
                    _ => DocsFormat::Markdown,
                },
            },
            (ToolKind::Infracost, "breakdown") => ToolInvocation::InfracostBreakdown {
                path: p.path_or_cwd(),
            },
            (ToolKind::Inframap, "diagram") => ToolInvocation::InframapDiagram {
                input: p.required("input")?,
                format: DiagramFormat::parse(p.optional("format"))?,
            },
            (ToolKind::Inframap, "diagram-hcl") => ToolInvocation::InframapDiagramHcl {
                path: p.path_or_cwd(),
                format: DiagramFormat::parse(p.optional("format"))?,
            },
            (ToolKind::OpenInfraQuote, "analyze") => ToolInvocation::OpenInfraQuoteAnalyze {
                file: p.required("file")?,
                region: p.optional("region").map(str::to_string),
            },
            (kind, action) => {
                return Err(ToolError::UnknownAction {
                    tool: kind.as_str().to_string(),
                    action: action.to_string(),
                })
            }
        };

        Ok(invocation)
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolInvocation::SteampipeQuery { .. } => ToolKind::Steampipe,
            ToolInvocation::GitleaksDir { .. } | ToolInvocation::GitleaksGit { .. } => {
                ToolKind::Gitleaks
            }
            ToolInvocation::TrivyFs { .. }
            | ToolInvocation::TrivyImage { .. }
            | ToolInvocation::TrivyConfig { .. } => ToolKind::Trivy,
            ToolInvocation::CheckovScan { .. } => ToolKind::Checkov,
            ToolInvocation::TflintLint { .. } => ToolKind::Tflint,
            ToolInvocation::TerraformDocsGenerate { .. } => ToolKind::TerraformDocs,
            ToolInvocation::InfracostBreakdown { .. } => ToolKind::Infracost,
            ToolInvocation::InframapDiagram { .. } | ToolInvocation::InframapDiagramHcl { .. } => {
                ToolKind::Inframap
            }
            ToolInvocation::OpenInfraQuoteAnalyze { .. } => ToolKind::OpenInfraQuote,
        }
    }
}

impl TryFrom<&ToolRequest> for ToolInvocation {
    type Error = ToolError;

    fn try_from(request: &ToolRequest) -> Result<Self, Self::Error> {
        ToolInvocation::parse(&request.tool, &request.action, &request.params)
    }
}
