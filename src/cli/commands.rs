use crate::cloud::CloudProvider;
use crate::config::parse_provider;
use clap::{Args, Parser, Subcommand, ValueEnum};
use genai::adapter::AdapterKind;
use std::path::PathBuf;

/// Containerized security tooling with an LLM-driven cloud investigator
#[derive(Parser, Debug)]
#[command(
    name = "shipwright",
    about = "Containerized security tooling with an LLM-driven cloud investigator",
    version,
    author,
    long_about = "shipwright runs infrastructure security tools (gitleaks, trivy, checkov, tflint, \
                  infracost, steampipe, ...) in disposable Docker containers and lets an LLM \
                  plan and repair steampipe investigations of AWS, Azure and GCP accounts."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Plan and run a steampipe investigation",
        long_about = "Asks the LLM for a 3-5 step query plan grounded in the provider's table \
                      catalogue, executes each query with automatic repair, then summarizes.\n\n\
                      Examples:\n  \
                      shipwright investigate \"find running EC2 instances\"\n  \
                      shipwright investigate \"public storage\" --provider azure --format json"
    )]
    Investigate(InvestigateArgs),

    #[command(
        about = "Let the LLM drive the tool registry",
        long_about = "Multi-turn conversation in which the LLM requests tool runs as JSON and \
                      finishes with a plain-text analysis.\n\n\
                      Examples:\n  \
                      shipwright agent \"scan ./infra for secrets and misconfigurations\"\n  \
                      shipwright agent \"estimate cost of ./infra\" --max-turns 8"
    )]
    Agent(AgentArgs),

    #[command(about = "Run an LLM-driven security audit of a cloud account")]
    Audit(AuditArgs),

    #[command(about = "Analyze a Terraform plan for cost optimizations")]
    Cost(CostArgs),

    #[command(
        about = "Run a single tool directly",
        long_about = "Runs one registered tool action in a container.\n\n\
                      Examples:\n  \
                      shipwright run gitleaks dir -p path=.\n  \
                      shipwright run steampipe query -p provider=aws -p sql='SELECT 1'"
    )]
    Run(RunArgs),

    #[command(about = "List registered tools and their actions")]
    Tools(ToolsArgs),

    #[command(about = "Check Docker and LLM backend availability")]
    Health(HealthArgs),

    #[command(about = "Show the effective configuration")]
    Config(ConfigArgs),
}

/// LLM selection shared by the commands that talk to a model.
#[derive(Args, Debug, Clone, Default)]
pub struct LlmArgs {
    #[arg(
        short = 'b',
        long,
        value_parser = parse_adapter_kind,
        help = "Force a specific AI backend provider (by default, the best available is auto-selected)"
    )]
    pub backend: Option<AdapterKind>,

    #[arg(short = 'm', long, value_name = "MODEL", help = "Model name to use")]
    pub model: Option<String>,

    #[arg(long, value_name = "SECONDS", help = "Request timeout in seconds")]
    pub timeout: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct InvestigateArgs {
    #[arg(value_name = "OBJECTIVE", help = "What to investigate, in plain language")]
    pub objective: String,

    #[arg(long, value_parser = parse_cloud_provider, default_value = "aws", help = "Cloud provider")]
    pub provider: CloudProvider,

    #[arg(long, value_name = "N", help = "Attempts per step, including the first")]
    pub max_retries: Option<usize>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,

    #[command(flatten)]
    pub llm: LlmArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct AgentArgs {
    #[arg(value_name = "OBJECTIVE", help = "Task for the agent")]
    pub objective: String,

    #[arg(long, value_name = "N", help = "Maximum tool requests before the summary turn")]
    pub max_turns: Option<usize>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,

    #[command(flatten)]
    pub llm: LlmArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct AuditArgs {
    #[arg(long, value_parser = parse_cloud_provider, default_value = "aws", help = "Cloud provider")]
    pub provider: CloudProvider,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,

    #[command(flatten)]
    pub llm: LlmArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct CostArgs {
    #[arg(value_name = "PLAN_FILE", help = "Terraform plan in JSON form")]
    pub plan_file: PathBuf,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,

    #[command(flatten)]
    pub llm: LlmArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[arg(value_name = "TOOL")]
    pub tool: String,

    #[arg(value_name = "ACTION")]
    pub action: String,

    #[arg(
        short = 'p',
        long = "param",
        value_name = "KEY=VALUE",
        value_parser = parse_key_val,
        help = "Tool parameter (repeatable)"
    )]
    pub params: Vec<(String, String)>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ToolsArgs {
    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct HealthArgs {
    #[arg(
        short = 'b',
        long,
        value_parser = parse_adapter_kind,
        help = "Specific backend to check (omit to check all)"
    )]
    pub backend: Option<AdapterKind>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_adapter_kind(s: &str) -> Result<AdapterKind, String> {
    parse_provider(s).map_err(|e| e.to_string())
}

fn parse_cloud_provider(s: &str) -> Result<CloudProvider, String> {
    s.parse::<CloudProvider>().map_err(|e| e.to_string())
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{}`", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in `{}`", s));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_investigate_defaults() {
        let args = CliArgs::parse_from(["shipwright", "investigate", "find open buckets"]);
        match args.command {
            Commands::Investigate(a) => {
                assert_eq!(a.objective, "find open buckets");
                assert_eq!(a.provider, CloudProvider::Aws);
                assert_eq!(a.format, OutputFormatArg::Human);
                assert!(a.max_retries.is_none());
                assert!(a.llm.backend.is_none());
                assert!(a.llm.timeout.is_none());
            }
            _ => panic!("Expected Investigate command"),
        }
    }

    #[test]
    fn test_investigate_with_options() {
        let args = CliArgs::parse_from([
            "shipwright",
            "investigate",
            "vms",
            "--provider",
            "azure",
            "--max-retries",
            "5",
            "--format",
            "json",
            "--backend",
            "claude",
            "--model",
            "claude-3-5-sonnet-latest",
            "--timeout",
            "120",
        ]);
        match args.command {
            Commands::Investigate(a) => {
                assert_eq!(a.provider, CloudProvider::Azure);
                assert_eq!(a.max_retries, Some(5));
                assert_eq!(a.format, OutputFormatArg::Json);
                assert_eq!(a.llm.backend, Some(AdapterKind::Anthropic));
                assert_eq!(a.llm.model.as_deref(), Some("claude-3-5-sonnet-latest"));
                assert_eq!(a.llm.timeout, Some(120));
            }
            _ => panic!("Expected Investigate command"),
        }
    }

    #[test]
    fn test_invalid_provider_rejected() {
        let result = CliArgs::try_parse_from(["shipwright", "audit", "--provider", "oracle"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_run_params() {
        let args = CliArgs::parse_from([
            "shipwright",
            "run",
            "steampipe",
            "query",
            "-p",
            "provider=aws",
            "--param",
            "sql=SELECT a = 1",
        ]);
        match args.command {
            Commands::Run(a) => {
                assert_eq!(a.tool, "steampipe");
                assert_eq!(a.action, "query");
                assert_eq!(
                    a.params,
                    vec![
                        ("provider".to_string(), "aws".to_string()),
                        ("sql".to_string(), "SELECT a = 1".to_string()),
                    ]
                );
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_parse_key_val_errors() {
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
        assert_eq!(parse_key_val("k=").unwrap(), ("k".to_string(), String::new()));
    }

    #[test]
    fn test_agent_max_turns() {
        let args = CliArgs::parse_from(["shipwright", "agent", "task", "--max-turns", "8"]);
        match args.command {
            Commands::Agent(a) => assert_eq!(a.max_turns, Some(8)),
            _ => panic!("Expected Agent command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["shipwright", "-v", "tools"]);
        assert!(args.verbose);
        let args = CliArgs::parse_from(["shipwright", "health", "-q"]);
        assert!(args.quiet);
        let args = CliArgs::parse_from(["shipwright", "--log-level", "debug", "config"]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_adapter_kind_parsing() {
        assert_eq!(parse_adapter_kind("ollama"), Ok(AdapterKind::Ollama));
        assert_eq!(parse_adapter_kind("grok"), Ok(AdapterKind::Xai));
        assert!(parse_adapter_kind("invalid").is_err());
    }
}
