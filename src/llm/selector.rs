use crate::config::ShipwrightConfig;
use crate::llm::{GenAIClient, LLMClient};
use anyhow::Result;
use genai::adapter::AdapterKind;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5-coder:7b";

pub struct SelectedClient {
    pub client: Arc<dyn LLMClient>,
    pub provider: AdapterKind,
    pub description: String,
}

pub async fn select_llm_client(config: &ShipwrightConfig) -> Result<SelectedClient> {
    if let Some(selected) = try_configured_provider(config) {
        return Ok(selected);
    }

    if let Some(selected) = try_ollama(config).await {
        return Ok(selected);
    }

    Err(anyhow::anyhow!(
        "No LLM backend available. Please either:\n\
         - Set an API key (ANTHROPIC_API_KEY, OPENAI_API_KEY, etc.) and SHIPWRIGHT_PROVIDER\n\
         - Start Ollama locally (ollama serve)"
    ))
}

fn try_configured_provider(config: &ShipwrightConfig) -> Option<SelectedClient> {
    let provider = config.provider;

    if provider == AdapterKind::Ollama {
        debug!("Skipping Ollama in configured provider check - availability is probed separately");
        return None;
    }

    if !provider_has_credentials(provider) {
        debug!(provider = %provider, "Skipping provider - no credentials available");
        return None;
    }

    let client = GenAIClient::new(
        provider,
        config.model.clone(),
        Duration::from_secs(config.request_timeout_secs),
    );
    info!(provider = %provider, model = %config.model, "Using configured provider");

    Some(SelectedClient {
        client: Arc::new(client),
        provider,
        description: format!("{} ({})", provider, config.model),
    })
}

async fn try_ollama(config: &ShipwrightConfig) -> Option<SelectedClient> {
    if !is_ollama_available().await {
        debug!("Ollama not available");
        return None;
    }

    let model = if config.provider == AdapterKind::Ollama {
        config.model.clone()
    } else {
        DEFAULT_OLLAMA_MODEL.to_string()
    };

    let client = GenAIClient::new(
        AdapterKind::Ollama,
        model.clone(),
        Duration::from_secs(config.request_timeout_secs),
    );
    info!(model = %model, "Using Ollama");

    Some(SelectedClient {
        client: Arc::new(client),
        provider: AdapterKind::Ollama,
        description: format!("Ollama ({})", model),
    })
}

pub fn provider_has_credentials(provider: AdapterKind) -> bool {
    match provider.default_key_env_name() {
        None => true,
        Some(env_var) => std::env::var(env_var).is_ok(),
    }
}

pub fn ollama_base_url() -> String {
    std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string())
}

/// Probes the local Ollama server's model listing endpoint.
pub async fn is_ollama_available() -> bool {
    let url = format!("{}/api/tags", ollama_base_url());

    match reqwest::Client::new()
        .get(&url)
        .timeout(Duration::from_secs(2))
        .send()
        .await
    {
        Ok(resp) => {
            let available = resp.status().is_success();
            debug!(available, "Ollama availability check");
            available
        }
        Err(e) => {
            debug!(error = %e, "Ollama not available");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_provider_credentials_check() {
        assert!(provider_has_credentials(AdapterKind::Ollama));

        let _ = provider_has_credentials(AdapterKind::OpenAI);
        let _ = provider_has_credentials(AdapterKind::Anthropic);
    }

    #[test]
    #[serial]
    fn test_ollama_base_url_override() {
        std::env::set_var("OLLAMA_HOST", "http://gpu-box:11434");
        assert_eq!(ollama_base_url(), "http://gpu-box:11434");
        std::env::remove_var("OLLAMA_HOST");
        assert_eq!(ollama_base_url(), "http://localhost:11434");
    }
}
