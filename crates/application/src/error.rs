use domain::{ConnectionId, DomainError, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("connection {0} is not connected")]
    NotConnected(ConnectionId),
    #[error("identity error: {0}")]
    Identity(#[from] DomainError),
    #[error("handler `{handler}` failed: {source}")]
    Handler {
        handler: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("durable store error: {0}")]
    Store(#[from] RepositoryError),
    #[error("chat history is disabled")]
    HistoryDisabled,
    #[error("shutdown error: {0}")]
    Shutdown(String),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        ChatError::Validation(message.into())
    }

    /// 是否应作为客户端错误返回（而非服务端故障）
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ChatError::Validation(_)
                | ChatError::NotConnected(_)
                | ChatError::Handler { .. }
                | ChatError::HistoryDisabled
        )
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
