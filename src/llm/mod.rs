//! LLM client abstraction layer
//!
//! Planner, repair, analysis and the tool-use loop all talk to the model
//! through the [`LLMClient`] trait, so the GenAI-backed client and the
//! scripted mock are interchangeable.

mod client;
mod complete;
mod error;
mod genai;
mod mock;
mod selector;
mod types;

pub use client::LLMClient;
pub use complete::{chat_cancellable, complete};
pub use error::BackendError;
pub use genai::{GenAIClient, API_BASE_URL_ENV};
pub use mock::{MockLLMClient, MockResponse};
pub use selector::{
    is_ollama_available, ollama_base_url, provider_has_credentials, select_llm_client,
    SelectedClient, DEFAULT_OLLAMA_MODEL,
};
pub use types::{ChatMessage, LLMRequest, LLMResponse, MessageRole};
