//! Subcommand handlers
//!
//! Each handler returns the process exit code: 0 on success, 1 on error,
//! 130 when interrupted.

use super::commands::{
    AgentArgs, AuditArgs, ConfigArgs, CostArgs, HealthArgs, InvestigateArgs, LlmArgs, RunArgs,
    ToolsArgs,
};
use super::output::{HealthStatus, OutputFormat, OutputFormatter, ToolListing};
use crate::config::ShipwrightConfig;
use crate::conversation::{AgentError, ToolUseAgent};
use crate::investigation::{InvestigationAgent, InvestigationError};
use crate::llm::{
    is_ollama_available, ollama_base_url, provider_has_credentials, select_llm_client,
    GenAIClient, LLMClient,
};
use crate::sandbox::{check_docker, DockerSandbox, Sandbox};
use crate::tools::{SteampipeRunner, ToolRegistry, ToolRequest};
use anyhow::{Context, Result};
use genai::adapter::AdapterKind;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 130;

const CHECKED_PROVIDERS: [AdapterKind; 6] = [
    AdapterKind::Ollama,
    AdapterKind::OpenAI,
    AdapterKind::Anthropic,
    AdapterKind::Gemini,
    AdapterKind::Xai,
    AdapterKind::Groq,
];

/// Environment defaults overridden by command-line flags, then validated.
pub fn build_config(llm: &LlmArgs) -> Result<ShipwrightConfig> {
    let mut config = ShipwrightConfig::default();
    if let Some(provider) = llm.backend {
        config = config.with_provider(provider);
        debug!("Provider explicitly set to: {:?}", provider);
    }
    if let Some(model) = &llm.model {
        config.model = model.clone();
    }
    if let Some(timeout) = llm.timeout {
        config.request_timeout_secs = timeout;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_backend_hints(provider: AdapterKind) {
    eprintln!("\nPossible solutions:");
    match provider.default_key_env_name() {
        None => {
            eprintln!("  - Ensure Ollama is running: ollama serve");
            eprintln!("  - Check OLLAMA_HOST environment variable (default: http://localhost:11434)");
        }
        Some(key) => eprintln!("  - Set {} environment variable", key),
    }
    eprintln!("  - Try a different provider: --backend openai, --backend claude, etc.");
}

async fn llm_client(config: &ShipwrightConfig, explicit: bool) -> Result<Arc<dyn LLMClient>> {
    if explicit {
        if !provider_has_credentials(config.provider) {
            print_backend_hints(config.provider);
            anyhow::bail!("No credentials configured for provider {}", config.provider);
        }
        info!(provider = %config.provider, model = %config.model, "Using explicitly specified backend");
        return Ok(Arc::new(GenAIClient::new(
            config.provider,
            config.model.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )));
    }

    let selected = select_llm_client(config).await?;
    info!("Using {}", selected.description);
    Ok(selected.client)
}

fn sandbox(config: &ShipwrightConfig) -> Result<Arc<dyn Sandbox>> {
    let sandbox = DockerSandbox::from_config(config).context("Docker is required to run tools")?;
    Ok(Arc::new(sandbox))
}

fn emit(format: OutputFormat, render: impl FnOnce(&OutputFormatter) -> Result<String>) -> i32 {
    match render(&OutputFormatter::new(format)) {
        Ok(out) => {
            println!("{}", out.trim_end());
            EXIT_OK
        }
        Err(e) => {
            error!("Failed to format output: {:#}", e);
            EXIT_FAILURE
        }
    }
}

fn setup_failed(e: anyhow::Error) -> i32 {
    error!("{:#}", e);
    EXIT_FAILURE
}

fn agent_failed(e: AgentError) -> i32 {
    if e.is_cancelled() {
        warn!("Interrupted");
        EXIT_INTERRUPTED
    } else {
        error!("Agent failed: {}", e);
        EXIT_FAILURE
    }
}

pub async fn handle_investigate(args: &InvestigateArgs, cancel: &CancellationToken) -> i32 {
    let setup = async {
        let mut config = build_config(&args.llm)?;
        if let Some(max_retries) = args.max_retries {
            config.max_retries = max_retries;
            config.validate().context("Invalid configuration")?;
        }
        let llm = llm_client(&config, args.llm.backend.is_some()).await?;
        let sandbox = sandbox(&config)?;
        Ok::<_, anyhow::Error>((config, llm, sandbox))
    };
    let (config, llm, sandbox) = match setup.await {
        Ok(parts) => parts,
        Err(e) => return setup_failed(e),
    };

    let runner = Arc::new(SteampipeRunner::new(sandbox, config.default_region.clone()));
    let agent = InvestigationAgent::new(llm, runner)
        .with_max_retries(config.max_retries as u32)
        .with_default_region(config.default_region.clone());

    match agent.investigate(&args.objective, args.provider, cancel).await {
        Ok(report) => emit(args.format.into(), |f| f.format_investigation(&report)),
        Err(InvestigationError::Cancelled) => {
            warn!("Investigation interrupted");
            EXIT_INTERRUPTED
        }
        Err(e) => {
            error!("Investigation failed: {}", e);
            EXIT_FAILURE
        }
    }
}

async fn tool_agent(llm_args: &LlmArgs, max_turns: Option<usize>) -> Result<ToolUseAgent> {
    let mut config = build_config(llm_args)?;
    if let Some(turns) = max_turns {
        config.max_tool_turns = turns;
        config.validate().context("Invalid configuration")?;
    }
    let llm = llm_client(&config, llm_args.backend.is_some()).await?;
    let registry = Arc::new(ToolRegistry::standard(sandbox(&config)?, &config.default_region));
    Ok(ToolUseAgent::new(llm, registry).with_max_turns(config.max_tool_turns))
}

pub async fn handle_agent(args: &AgentArgs, cancel: &CancellationToken) -> i32 {
    let agent = match tool_agent(&args.llm, args.max_turns).await {
        Ok(agent) => agent,
        Err(e) => return setup_failed(e),
    };

    match agent.investigate_with_tools(&args.objective, cancel).await {
        Ok(report) => emit(args.format.into(), |f| f.format_tool_report(&report)),
        Err(e) => agent_failed(e),
    }
}

pub async fn handle_audit(args: &AuditArgs, cancel: &CancellationToken) -> i32 {
    let agent = match tool_agent(&args.llm, None).await {
        Ok(agent) => agent,
        Err(e) => return setup_failed(e),
    };

    let timestamp = chrono::Utc::now().to_rfc3339();
    match agent.security_audit(args.provider, timestamp, cancel).await {
        Ok(report) => emit(args.format.into(), |f| f.format_audit(&report)),
        Err(e) => agent_failed(e),
    }
}

pub async fn handle_cost(args: &CostArgs, cancel: &CancellationToken) -> i32 {
    if !args.plan_file.is_file() {
        error!("Plan file does not exist: {}", args.plan_file.display());
        return EXIT_FAILURE;
    }
    let plan_file = args.plan_file.display().to_string();

    let agent = match tool_agent(&args.llm, None).await {
        Ok(agent) => agent,
        Err(e) => return setup_failed(e),
    };

    match agent.cost_optimization(&plan_file, cancel).await {
        Ok(report) => emit(args.format.into(), |f| f.format_cost(&report)),
        Err(e) => agent_failed(e),
    }
}

pub async fn handle_run(args: &RunArgs, cancel: &CancellationToken) -> i32 {
    let config = match build_config(&LlmArgs::default()) {
        Ok(config) => config,
        Err(e) => return setup_failed(e),
    };
    let sandbox = match sandbox(&config) {
        Ok(sandbox) => sandbox,
        Err(e) => return setup_failed(e),
    };
    let registry = ToolRegistry::standard(sandbox, &config.default_region);

    let request = args
        .params
        .iter()
        .fold(ToolRequest::new(&args.tool, &args.action), |req, (k, v)| {
            req.param(k, v)
        });

    let result = registry.dispatch(&request, cancel).await;
    if cancel.is_cancelled() {
        return EXIT_INTERRUPTED;
    }
    let failed = result.is_error();
    match emit(args.format.into(), |f| f.format_tool_result(&result)) {
        EXIT_OK if failed => EXIT_FAILURE,
        code => code,
    }
}

pub fn handle_tools(args: &ToolsArgs) -> i32 {
    let listing = ToolListing::all();
    emit(args.format.into(), |f| f.format_tools(&listing))
}

async fn provider_status(provider: AdapterKind, config: &ShipwrightConfig) -> HealthStatus {
    match provider.default_key_env_name() {
        None => {
            let host = ollama_base_url();
            if is_ollama_available().await {
                HealthStatus::available(format!("Connected to {}", host))
                    .with_details(format!("Model: {}", config.model))
            } else {
                HealthStatus::unavailable(format!("Cannot connect to {}", host))
                    .with_details("Ensure Ollama is running: ollama serve")
            }
        }
        Some(key) if provider_has_credentials(provider) => {
            HealthStatus::available("API key is configured").with_details(format!("Using {}", key))
        }
        Some(key) => HealthStatus::unavailable("API key not configured")
            .with_details(format!("Set {} environment variable", key)),
    }
}

pub async fn handle_health(args: &HealthArgs) -> i32 {
    info!("Checking Docker and backend health");
    let config = ShipwrightConfig::default();
    let mut results = BTreeMap::new();

    let docker = match check_docker().await {
        Ok(Some(version)) => HealthStatus::available(format!("Docker API {}", version)),
        Ok(None) => HealthStatus::unavailable("Docker daemon not reachable")
            .with_details("Start Docker or set DOCKER_HOST"),
        Err(e) => HealthStatus::unavailable(e.to_string()),
    };
    let docker_ok = docker.available;
    results.insert("docker".to_string(), docker);

    let providers: Vec<AdapterKind> = match args.backend {
        Some(provider) => vec![provider],
        None => CHECKED_PROVIDERS.to_vec(),
    };
    let mut any_backend = false;
    for provider in providers {
        let status = provider_status(provider, &config).await;
        debug!(provider = %provider, available = status.available, "Backend checked");
        any_backend |= status.available;
        results.insert(format!("{:?}", provider), status);
    }

    match emit(args.format.into(), |f| f.format_health(&results)) {
        EXIT_OK if docker_ok && any_backend => EXIT_OK,
        EXIT_OK => EXIT_FAILURE,
        code => code,
    }
}

pub fn handle_config(args: &ConfigArgs) -> i32 {
    let config = ShipwrightConfig::default();
    if let Err(e) = config.validate() {
        warn!("Configuration is invalid: {}", e);
    }
    emit(args.format.into(), |f| f.format_config(&config))
}
