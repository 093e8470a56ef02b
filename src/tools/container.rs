use super::error::ToolError;
use super::request::{DocsFormat, Params, ToolInvocation, ToolKind};
use super::trait_def::ToolAdapter;
use crate::sandbox::{ExecOutput, ExecSpec, Sandbox, SandboxError};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const WORKSPACE: &str = "/workspace";
const TRIVY_SEVERITY: &str = "HIGH,CRITICAL";

/// Static description of a containerised CLI tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSpec {
    pub kind: ToolKind,
    pub image: &'static str,
    pub binary: &'static str,
    /// The tool reports findings through a non-zero exit status
    pub accept_any_exit: bool,
    /// Reported instead of an empty result
    pub empty_output_message: Option<&'static str>,
    /// Host variables forwarded into the container when set
    pub passthrough_env: &'static [&'static str],
}

pub const GITLEAKS: ToolSpec = ToolSpec {
    kind: ToolKind::Gitleaks,
    image: "zricethezav/gitleaks:latest",
    binary: "/usr/bin/gitleaks",
    accept_any_exit: true,
    empty_output_message: Some("No secrets found"),
    passthrough_env: &[],
};

pub const TRIVY: ToolSpec = ToolSpec {
    kind: ToolKind::Trivy,
    image: "aquasec/trivy:latest",
    binary: "trivy",
    accept_any_exit: false,
    empty_output_message: Some("No HIGH or CRITICAL issues found"),
    passthrough_env: &["GITHUB_TOKEN"],
};

pub const CHECKOV: ToolSpec = ToolSpec {
    kind: ToolKind::Checkov,
    image: "bridgecrew/checkov:latest",
    binary: "checkov",
    accept_any_exit: true,
    empty_output_message: Some("No failed checks"),
    passthrough_env: &[],
};

pub const TFLINT: ToolSpec = ToolSpec {
    kind: ToolKind::Tflint,
    image: "ghcr.io/terraform-linters/tflint:latest",
    binary: "tflint",
    accept_any_exit: true,
    empty_output_message: Some("No lint issues found"),
    passthrough_env: &[],
};

pub const TERRAFORM_DOCS: ToolSpec = ToolSpec {
    kind: ToolKind::TerraformDocs,
    image: "quay.io/terraform-docs/terraform-docs:latest",
    binary: "terraform-docs",
    accept_any_exit: false,
    empty_output_message: None,
    passthrough_env: &[],
};

pub const INFRACOST: ToolSpec = ToolSpec {
    kind: ToolKind::Infracost,
    image: "infracost/infracost:latest",
    binary: "infracost",
    accept_any_exit: false,
    empty_output_message: None,
    passthrough_env: &["INFRACOST_API_KEY"],
};

pub const INFRAMAP: ToolSpec = ToolSpec {
    kind: ToolKind::Inframap,
    image: "cycloid/inframap:latest",
    binary: "inframap",
    accept_any_exit: false,
    empty_output_message: Some("No resources found to diagram"),
    passthrough_env: &[],
};

pub const OPENINFRAQUOTE: ToolSpec = ToolSpec {
    kind: ToolKind::OpenInfraQuote,
    image: "ghcr.io/initech-consulting/openinfraquote:latest",
    binary: "openinfraquote",
    accept_any_exit: false,
    empty_output_message: None,
    passthrough_env: &[],
};

pub const CONTAINER_TOOLS: &[ToolSpec] = &[
    GITLEAKS,
    TRIVY,
    CHECKOV,
    TFLINT,
    TERRAFORM_DOCS,
    INFRACOST,
    INFRAMAP,
    OPENINFRAQUOTE,
];

fn mount_dir(exec: ExecSpec, path: &str) -> ExecSpec {
    exec.host_dir(path, WORKSPACE).workdir(WORKSPACE)
}

/// Mounts the directory holding `file` and returns the file name to pass
/// to the tool.
fn mount_file(exec: ExecSpec, file: &str, param: &str) -> Result<(ExecSpec, String), ToolError> {
    let path = Path::new(file);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ToolError::InvalidParam {
            param: param.to_string(),
            message: format!("not a file path: {}", file),
        })?
        .to_string();

    let parent = path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ".".to_string());

    Ok((mount_dir(exec, &parent), name))
}

fn is_empty_output(text: &str) -> bool {
    matches!(text.trim(), "" | "[]" | "null")
}

pub struct ContainerTool {
    spec: ToolSpec,
    sandbox: Arc<dyn Sandbox>,
}

impl ContainerTool {
    pub fn new(spec: ToolSpec, sandbox: Arc<dyn Sandbox>) -> Self {
        Self { spec, sandbox }
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn build_exec(&self, invocation: &ToolInvocation) -> Result<ExecSpec, ToolError> {
        let spec = &self.spec;
        let mut exec = ExecSpec::new(spec.image, spec.binary).accept_any_exit(spec.accept_any_exit);

        for key in spec.passthrough_env {
            if let Ok(value) = std::env::var(key) {
                exec = exec.env(*key, value);
            }
        }

        let exec = match invocation {
            ToolInvocation::GitleaksDir { path } | ToolInvocation::GitleaksGit { path } => {
                let mode = if matches!(invocation, ToolInvocation::GitleaksGit { .. }) {
                    "git"
                } else {
                    "dir"
                };
                mount_dir(exec, path).args([
                    mode,
                    ".",
                    "--report-format",
                    "json",
                    "--report-path",
                    "/dev/stdout",
                    "--no-banner",
                ])
            }
            ToolInvocation::TrivyFs { path } => mount_dir(exec, path).args([
                "fs",
                "--format",
                "json",
                "--severity",
                TRIVY_SEVERITY,
                ".",
            ]),
            ToolInvocation::TrivyImage { image } => exec
                .args(["image", "--format", "json", "--severity", TRIVY_SEVERITY])
                .arg(image.as_str()),
            ToolInvocation::TrivyConfig { path } => mount_dir(exec, path).args([
                "config",
                "--format",
                "json",
                "--severity",
                TRIVY_SEVERITY,
                ".",
            ]),
            ToolInvocation::CheckovScan { path, framework } => mount_dir(exec, path)
                .args(["--directory", ".", "--output", "json", "--framework"])
                .arg(framework.as_str()),
            ToolInvocation::TflintLint { path } => {
                mount_dir(exec, path).args(["--format", "json"])
            }
            ToolInvocation::TerraformDocsGenerate { path, format } => {
                let renderer = match format {
                    DocsFormat::Markdown => "markdown",
                    DocsFormat::Json => "json",
                };
                mount_dir(exec, path).args([renderer, "."])
            }
            ToolInvocation::InfracostBreakdown { path } => mount_dir(exec, path).args([
                "breakdown",
                "--path",
                ".",
                "--format",
                "json",
            ]),
            ToolInvocation::InframapDiagram { input, .. } => {
                let (exec, name) = mount_file(exec, input, "input")?;
                exec.arg("generate").arg(name)
            }
            ToolInvocation::InframapDiagramHcl { path, .. } => {
                mount_dir(exec, path).args(["generate", "--hcl", "."])
            }
            ToolInvocation::OpenInfraQuoteAnalyze { file, region } => {
                let (mut exec, name) = mount_file(exec, file, "file")?;
                if let Some(region) = region {
                    exec = exec.env("AWS_REGION", region.as_str());
                }
                exec.args(["estimate", "--terraform-plan-file"])
                    .arg(name)
                    .args(["--output", "json"])
            }
            ToolInvocation::SteampipeQuery { .. } => {
                return Err(ToolError::UnknownAction {
                    tool: spec.kind.as_str().to_string(),
                    action: "query".to_string(),
                })
            }
        };

        Ok(exec)
    }

    /// Turns a finished run into the text handed back to the caller.
    ///
    /// With `accept_any_exit`, a non-zero status with nothing on stdout is a
    /// crash rather than a findings report.
    fn interpret(&self, output: ExecOutput) -> Result<String, ToolError> {
        if output.exit_code != 0 && output.stdout.trim().is_empty() && !output.stderr.trim().is_empty() {
            return Err(ToolError::Sandbox(SandboxError::NonZeroExit {
                code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            }));
        }

        if is_empty_output(&output.stdout) {
            if let Some(message) = self.spec.empty_output_message {
                return Ok(message.to_string());
            }
        }

        Ok(output.primary_text().to_string())
    }
}

#[async_trait]
impl ToolAdapter for ContainerTool {
    fn name(&self) -> &'static str {
        self.spec.kind.as_str()
    }

    fn description(&self) -> &'static str {
        self.spec.kind.description()
    }

    fn actions(&self) -> Vec<&'static str> {
        self.spec.kind.actions().iter().map(|a| a.name).collect()
    }

    fn usage(&self) -> Vec<&'static str> {
        self.spec.kind.actions().iter().map(|a| a.usage).collect()
    }

    async fn invoke(
        &self,
        action: &str,
        params: &Params,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let invocation = ToolInvocation::parse(self.name(), action, params)?;
        let exec = self.build_exec(&invocation)?;
        debug!(tool = self.name(), action, args = ?exec.args, "Built tool command");

        let output = self.sandbox.run(&exec, cancel).await?;
        self.interpret(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{Input, MockSandbox};
    use crate::tools::request::DiagramFormat;

    fn tool(spec: ToolSpec) -> (ContainerTool, Arc<MockSandbox>) {
        let sandbox = Arc::new(MockSandbox::new());
        (ContainerTool::new(spec, sandbox.clone()), sandbox)
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_every_container_tool_has_unique_kind() {
        let mut kinds: Vec<_> = CONTAINER_TOOLS.iter().map(|s| s.kind.as_str()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), CONTAINER_TOOLS.len());
        assert!(!kinds.contains(&"steampipe"));
    }

    #[test]
    fn test_trivy_image_has_no_mount() {
        let (trivy, _) = tool(TRIVY);
        let exec = trivy
            .build_exec(&ToolInvocation::TrivyImage {
                image: "nginx:1.25".to_string(),
            })
            .unwrap();

        assert_eq!(
            exec.args,
            vec!["image", "--format", "json", "--severity", "HIGH,CRITICAL", "nginx:1.25"]
        );
        assert!(exec.inputs.is_empty());
    }

    #[test]
    fn test_directory_tools_mount_workspace() {
        let (checkov, _) = tool(CHECKOV);
        let exec = checkov
            .build_exec(&ToolInvocation::CheckovScan {
                path: "infra".to_string(),
                framework: "terraform".to_string(),
            })
            .unwrap();

        assert_eq!(
            exec.inputs,
            vec![Input::HostDir {
                host: "infra".into(),
                mount_path: WORKSPACE.to_string()
            }]
        );
        assert_eq!(exec.workdir.as_deref(), Some(WORKSPACE));
        assert!(exec.accept_any_exit);
    }

    #[test]
    fn test_file_tools_mount_parent_directory() {
        let (oiq, _) = tool(OPENINFRAQUOTE);
        let exec = oiq
            .build_exec(&ToolInvocation::OpenInfraQuoteAnalyze {
                file: "plans/tfplan.json".to_string(),
                region: Some("eu-west-1".to_string()),
            })
            .unwrap();

        assert_eq!(exec.inputs[0].mount_path(), WORKSPACE);
        assert!(matches!(&exec.inputs[0], Input::HostDir { host, .. } if host == Path::new("plans")));
        assert!(exec.args.contains(&"tfplan.json".to_string()));
        assert_eq!(exec.env.get("AWS_REGION"), Some(&"eu-west-1".to_string()));

        let (inframap, _) = tool(INFRAMAP);
        let exec = inframap
            .build_exec(&ToolInvocation::InframapDiagram {
                input: "terraform.tfstate".to_string(),
                format: DiagramFormat::Png,
            })
            .unwrap();
        assert!(matches!(&exec.inputs[0], Input::HostDir { host, .. } if host == Path::new(".")));
        assert_eq!(exec.args, vec!["generate", "terraform.tfstate"]);
    }

    #[tokio::test]
    async fn test_gitleaks_empty_output_is_success_message() {
        let (gitleaks, sandbox) = tool(GITLEAKS);
        sandbox.add_output(ExecOutput::new("[]", "", 0));

        let out = gitleaks
            .invoke("dir", &params(&[("path", ".")]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "No secrets found");
        assert_eq!(sandbox.specs()[0].args[0], "dir");
    }

    #[tokio::test]
    async fn test_gitleaks_findings_with_nonzero_exit() {
        let (gitleaks, sandbox) = tool(GITLEAKS);
        sandbox.add_output(ExecOutput::new(r#"[{"RuleID": "aws-access-token"}]"#, "leaks found: 1", 1));

        let out = gitleaks
            .invoke("git", &Params::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.contains("aws-access-token"));
    }

    #[tokio::test]
    async fn test_crash_with_accept_any_exit_is_error() {
        let (tflint, sandbox) = tool(TFLINT);
        sandbox.add_output(ExecOutput::new("", "Failed to load configurations", 1));

        let err = tflint
            .invoke("lint", &Params::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Sandbox(SandboxError::NonZeroExit { code: 1, .. })));
    }

    #[tokio::test]
    async fn test_unknown_action_never_runs_sandbox() {
        let (trivy, sandbox) = tool(TRIVY);
        let err = trivy
            .invoke("sbom", &Params::new(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::UnknownAction { .. }));
        assert_eq!(sandbox.run_count(), 0);
    }
}
