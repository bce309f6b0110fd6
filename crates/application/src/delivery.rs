//! 消息投递出口
//!
//! 核心只决定投递给谁，具体如何送达由传输层实现。

use async_trait::async_trait;
use domain::{ChatMessageDto, ChatUserInfoDto, ConnectionId, Destination};
use serde::Serialize;
use thiserror::Error;

/// 在线状态变更通知
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusChange {
    /// 有用户上线，附带当前所有在线用户
    Connected { users: Vec<ChatUserInfoDto> },
    Disconnected { user: ChatUserInfoDto },
    /// 连接失败，只发给出错的连接
    Error { user: ChatUserInfoDto },
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection {0} is gone")]
    ConnectionGone(ConnectionId),
    #[error("delivery failed: {0}")]
    Failed(String),
}

impl DeliveryError {
    pub fn failed(message: impl Into<String>) -> Self {
        DeliveryError::Failed(message.into())
    }
}

#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// `OTHERS` 广播到频道，`SELF` 回复发送者
    async fn deliver(
        &self,
        channel: &str,
        sender: ConnectionId,
        message: &ChatMessageDto,
        destination: Destination,
    ) -> Result<(), DeliveryError>;

    async fn broadcast_status(
        &self,
        channel: &str,
        change: &StatusChange,
    ) -> Result<(), DeliveryError>;

    async fn send_status(
        &self,
        connection_id: ConnectionId,
        change: &StatusChange,
    ) -> Result<(), DeliveryError>;
}
