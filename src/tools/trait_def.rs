use super::error::ToolError;
use super::request::Params;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait ToolAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn actions(&self) -> Vec<&'static str>;
    /// Example request per action, as shown to the model
    fn usage(&self) -> Vec<&'static str>;
    async fn invoke(
        &self,
        action: &str,
        params: &Params,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError>;
}
