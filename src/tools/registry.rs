//! Tool registry
//!
//! Owns every adapter the tool-use loop may call and turns a
//! [`ToolRequest`] into a [`ToolResult`] without ever failing the caller.

use super::container::{ContainerTool, CONTAINER_TOOLS};
use super::error::ToolError;
use super::request::{ToolInvocation, ToolRequest, ToolResult};
use super::steampipe::{QueryRunner, SteampipeRunner, SteampipeTool};
use super::trait_def::ToolAdapter;
use crate::sandbox::Sandbox;
use std::fmt::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const OUTPUT_PREVIEW_CHARS: usize = 200;

pub struct ToolRegistry {
    tools: Vec<Arc<dyn ToolAdapter>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn ToolAdapter>>) -> Self {
        Self { tools }
    }

    /// All built-in tools, executing through `sandbox`.
    pub fn standard(sandbox: Arc<dyn Sandbox>, default_region: &str) -> Self {
        let runner: Arc<dyn QueryRunner> =
            Arc::new(SteampipeRunner::new(sandbox.clone(), default_region));
        Self::with_query_runner(sandbox, runner, default_region)
    }

    pub fn with_query_runner(
        sandbox: Arc<dyn Sandbox>,
        runner: Arc<dyn QueryRunner>,
        default_region: &str,
    ) -> Self {
        let mut tools: Vec<Arc<dyn ToolAdapter>> =
            vec![Arc::new(SteampipeTool::new(runner, default_region))];
        tools.extend(
            CONTAINER_TOOLS
                .iter()
                .map(|spec| Arc::new(ContainerTool::new(*spec, sandbox.clone())) as Arc<dyn ToolAdapter>),
        );
        Self { tools }
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn ToolAdapter>> {
        self.tools
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name.trim()))
            .cloned()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    async fn invoke(
        &self,
        request: &ToolRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let invocation = ToolInvocation::try_from(request)?;
        let tool = self
            .get_tool(invocation.kind().as_str())
            .ok_or_else(|| ToolError::UnknownTool(request.tool.clone()))?;

        tool.invoke(&request.action, &request.params, cancel).await
    }

    /// Runs `request`; any failure is carried in the returned result.
    pub async fn dispatch(&self, request: &ToolRequest, cancel: &CancellationToken) -> ToolResult {
        info!(tool = %request.tool, action = %request.action, "Executing tool");

        match self.invoke(request, cancel).await {
            Ok(output) => {
                let preview: String = output.chars().take(OUTPUT_PREVIEW_CHARS).collect();
                info!(tool = %request.tool, bytes = output.len(), "Tool execution completed");
                debug!(tool = %request.tool, output_preview = %preview, "Tool output preview");
                ToolResult::success(request, output)
            }
            Err(e) => {
                warn!(tool = %request.tool, action = %request.action, error = %e, "Tool execution failed");
                ToolResult::failure(request, &e)
            }
        }
    }

    /// Numbered tool menu with one example request per action.
    pub fn describe(&self) -> String {
        let mut menu = String::from("You have access to the following tools:\n");

        for (index, tool) in self.tools.iter().enumerate() {
            let _ = write!(
                menu,
                "\n{}. {}: {}\n",
                index + 1,
                tool.name(),
                tool.description()
            );
            for usage in tool.usage() {
                let _ = writeln!(menu, "   Usage: {}", usage);
            }
        }

        menu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::MockSandbox;

    fn registry() -> (ToolRegistry, Arc<MockSandbox>) {
        let sandbox = Arc::new(MockSandbox::new());
        (ToolRegistry::standard(sandbox.clone(), "us-east-1"), sandbox)
    }

    #[test]
    fn test_registry_creation() {
        let (registry, _) = registry();
        assert_eq!(registry.len(), 9);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_tool_names() {
        let (registry, _) = registry();
        let names = registry.tool_names();
        for expected in [
            "steampipe",
            "gitleaks",
            "trivy",
            "checkov",
            "tflint",
            "terraform-docs",
            "infracost",
            "inframap",
            "openinfraquote",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_get_tool() {
        let (registry, _) = registry();
        assert_eq!(registry.get_tool("Trivy").unwrap().name(), "trivy");
        assert!(registry.get_tool("nonexistent").is_none());
    }

    #[test]
    fn test_describe_lists_every_usage() {
        let (registry, _) = registry();
        let menu = registry.describe();
        assert!(menu.starts_with("You have access to the following tools:"));
        assert!(menu.contains("1. steampipe:"));
        assert!(menu.contains(r#""action": "diagram-hcl""#));
        assert_eq!(menu.matches("Usage:").count(), 13);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool_returns_error_result() {
        let (registry, sandbox) = registry();
        let request = ToolRequest::new("terraform", "plan");

        let result = registry.dispatch(&request, &CancellationToken::new()).await;
        assert!(result.is_error());
        assert!(result.error.unwrap().contains("Unknown tool: terraform"));
        assert_eq!(result.tool, "terraform");
        assert_eq!(sandbox.run_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_action_returns_error_result() {
        let (registry, _) = registry();
        let request = ToolRequest::new("gitleaks", "history");

        let result = registry.dispatch(&request, &CancellationToken::new()).await;
        assert!(result.error.unwrap().contains("history"));
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let (registry, sandbox) = registry();
        sandbox.add_stdout("# Module docs");

        let request = ToolRequest::new("terraform-docs", "generate").param("path", "modules/vpc");
        let result = registry.dispatch(&request, &CancellationToken::new()).await;

        assert_eq!(result.output, "# Module docs");
        assert!(result.error.is_none());
        assert_eq!(sandbox.specs()[0].args, vec!["markdown", "."]);
    }

    #[tokio::test]
    async fn test_dispatch_adapter_failure_is_captured() {
        let (registry, _) = registry();
        let request = ToolRequest::new("trivy", "fs");

        let result = registry.dispatch(&request, &CancellationToken::new()).await;
        assert!(result.is_error());
        assert!(result.output.is_empty());
    }
}
