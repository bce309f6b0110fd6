//! 聊天事件处理器链
//!
//! 处理器按注册顺序执行。消息与断开事件在第一个错误处中止，
//! 初始化与关闭事件记录错误后继续执行后面的处理器。

mod anti_flood;

use std::sync::Arc;

use async_trait::async_trait;
use domain::{ChatMessage, ChatMessageDto, ConnectionId, Destination, UserInfo};

use crate::bus::MessageBus;
use crate::error::{ChatError, ChatResult};

pub use anti_flood::AntiFloodHandler;

/// 消息处理上下文，处理器可以修改投递目标或补充 metadata
#[derive(Debug, Clone)]
pub struct ReceiptContext {
    pub connection_id: ConnectionId,
    pub message: ChatMessage,
    pub delivery: ChatMessageDto,
    pub destination: Destination,
}

impl ReceiptContext {
    /// 把消息 metadata 同步到推送表示
    pub fn sync_delivery_metadata(&mut self) {
        self.delivery.metadata = serde_json::Value::Object(self.message.metadata.clone()).to_string();
    }
}

#[derive(Debug, Clone)]
pub struct DisconnectedContext {
    pub channel: String,
    pub connection_id: ConnectionId,
    pub user: Option<UserInfo>,
}

/// 初始化与关闭时的上下文，处理器可以在这里订阅消息
#[derive(Clone)]
pub struct LifecycleContext {
    pub channel: String,
    pub bus: MessageBus,
}

#[async_trait]
pub trait ChatEventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_init(&self, _ctx: &LifecycleContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_message_received(&self, _ctx: &mut ReceiptContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_disconnected(&self, _ctx: &DisconnectedContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_shutdown(&self, _ctx: &LifecycleContext) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerPolicy {
    AbortOnError,
    LogAndContinue,
}

#[derive(Clone, Default)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn ChatEventHandler>>,
}

impl HandlerChain {
    pub fn new(handlers: Vec<Arc<dyn ChatEventHandler>>) -> Self {
        Self { handlers }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn run_init(&self, ctx: &LifecycleContext, policy: HandlerPolicy) -> ChatResult<()> {
        for handler in &self.handlers {
            settle(policy, "init", handler.name(), handler.on_init(ctx).await)?;
        }
        Ok(())
    }

    pub async fn run_message_received(
        &self,
        ctx: &mut ReceiptContext,
        policy: HandlerPolicy,
    ) -> ChatResult<()> {
        for handler in &self.handlers {
            let result = handler.on_message_received(ctx).await;
            settle(policy, "message_received", handler.name(), result)?;
        }
        Ok(())
    }

    pub async fn run_disconnected(
        &self,
        ctx: &DisconnectedContext,
        policy: HandlerPolicy,
    ) -> ChatResult<()> {
        for handler in &self.handlers {
            let result = handler.on_disconnected(ctx).await;
            settle(policy, "disconnected", handler.name(), result)?;
        }
        Ok(())
    }

    pub async fn run_shutdown(
        &self,
        ctx: &LifecycleContext,
        policy: HandlerPolicy,
    ) -> ChatResult<()> {
        for handler in &self.handlers {
            settle(policy, "shutdown", handler.name(), handler.on_shutdown(ctx).await)?;
        }
        Ok(())
    }
}

fn settle(
    policy: HandlerPolicy,
    stage: &'static str,
    handler: &'static str,
    result: anyhow::Result<()>,
) -> ChatResult<()> {
    let Err(source) = result else {
        return Ok(());
    };
    tracing::error!(handler, stage, error = %source, "Chat event handler failed");
    match policy {
        HandlerPolicy::AbortOnError => Err(ChatError::Handler { handler, source }),
        HandlerPolicy::LogAndContinue => Ok(()),
    }
}
