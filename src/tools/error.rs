use super::steampipe::QueryError;
use crate::sandbox::SandboxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Unknown action '{action}' for tool {tool}")]
    UnknownAction { tool: String, action: String },

    #[error("Missing required parameter '{param}' for {tool} {action}")]
    MissingParam {
        tool: String,
        action: String,
        param: String,
    },

    #[error("Invalid parameter '{param}': {message}")]
    InvalidParam { param: String, message: String },

    #[error("Malformed tool request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl ToolError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            ToolError::Sandbox(e) => e.is_cancelled(),
            ToolError::Query(e) => e.is_cancelled(),
            _ => false,
        }
    }
}
