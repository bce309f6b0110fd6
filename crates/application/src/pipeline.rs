//! 单条消息的处理流程
//!
//! 顺序固定：检查发送者在线 → 构造消息 → 处理器链 → 入队 → 发布 → 投递。
//! 处理器链出错时消息不会入库也不会投递。

use std::sync::Arc;

use domain::{to_storage_precision, ChatMessage, ChatMessageDto, ConnectionId, Destination};

use crate::bus::MessageBus;
use crate::chat_log::ChatLog;
use crate::clock::Clock;
use crate::delivery::DeliverySink;
use crate::error::{ChatError, ChatResult};
use crate::handlers::{HandlerChain, HandlerPolicy, ReceiptContext};
use crate::presence::PresenceRegistry;

/// 一条消息处理完成后的结果
#[derive(Debug, Clone)]
pub struct ReceiveOutcome {
    pub stored: ChatMessage,
    pub delivery: ChatMessageDto,
    pub destination: Destination,
}

pub struct MessagePipeline {
    pub(crate) channel: String,
    pub(crate) presence: Arc<PresenceRegistry>,
    pub(crate) handlers: HandlerChain,
    pub(crate) chat_log: Arc<ChatLog>,
    pub(crate) bus: MessageBus,
    pub(crate) delivery: Arc<dyn DeliverySink>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl MessagePipeline {
    pub async fn receive(&self, sender: ConnectionId, text: &str) -> ChatResult<ReceiveOutcome> {
        let entry = self
            .presence
            .connected(sender)
            .ok_or(ChatError::NotConnected(sender))?;
        let user = entry.user.clone().ok_or(ChatError::NotConnected(sender))?;

        let message = ChatMessage::new(
            self.channel.as_str(),
            to_storage_precision(self.clock.now()),
            text,
            user,
        );
        let mut delivery = ChatMessageDto::from_history(&message);
        delivery.user_info = entry.to_dto();

        let mut ctx = ReceiptContext {
            connection_id: sender,
            message,
            delivery,
            destination: Destination::ALL,
        };
        self.handlers
            .run_message_received(&mut ctx, HandlerPolicy::AbortOnError)
            .await?;

        let ReceiptContext {
            message,
            delivery,
            destination,
            ..
        } = ctx;

        self.chat_log.add_message_log(message.clone());
        self.bus.publish(&message);

        if let Err(err) = self
            .delivery
            .deliver(&self.channel, sender, &delivery, destination)
            .await
        {
            tracing::warn!(
                channel = %self.channel,
                connection_id = %sender,
                error = %err,
                "Failed to deliver chat message"
            );
        }

        Ok(ReceiveOutcome {
            stored: message,
            delivery,
            destination,
        })
    }
}
