use async_trait::async_trait;
use domain::{CompletionRequest, CompletionResponse, ModelInfo};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("gateway returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode gateway response: {0}")]
    Decode(String),
    #[error("completion request timed out")]
    Timeout,
    #[error("completion request cancelled")]
    Cancelled,
}

impl GatewayError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// 外部补全服务。无状态，可被并发调用。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(&self, request: CompletionRequest)
        -> Result<CompletionResponse, GatewayError>;

    async fn list_models(&self) -> Result<Vec<ModelInfo>, GatewayError>;
}
