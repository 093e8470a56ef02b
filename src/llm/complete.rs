use super::client::LLMClient;
use super::error::BackendError;
use super::types::{ChatMessage, LLMRequest};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const COMPLETION_TEMPERATURE: f32 = 0.1;

/// Single-shot completion: optional system prompt plus one user prompt,
/// returning the full reply text.
///
/// The call is raced against `cancel`; a cancelled token wins and yields
/// [`BackendError::Cancelled`] without waiting for the provider.
pub async fn complete(
    client: &dyn LLMClient,
    system: Option<&str>,
    user: &str,
    cancel: &CancellationToken,
) -> Result<String, BackendError> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(user));

    let request = LLMRequest::new(messages).with_temperature(COMPLETION_TEMPERATURE);
    chat_cancellable(client, request, cancel).await
}

/// Sends a prepared request, honouring the cancellation token.
pub async fn chat_cancellable(
    client: &dyn LLMClient,
    request: LLMRequest,
    cancel: &CancellationToken,
) -> Result<String, BackendError> {
    if cancel.is_cancelled() {
        return Err(BackendError::Cancelled);
    }

    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(backend = client.name(), "LLM call cancelled");
            Err(BackendError::Cancelled)
        }
        response = client.chat(request) => {
            let response = response?;
            debug!(
                backend = client.name(),
                elapsed_ms = response.response_time.as_millis() as u64,
                "LLM call completed"
            );
            Ok(response.content)
        }
    }
}
