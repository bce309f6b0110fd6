use std::sync::Arc;

use async_trait::async_trait;
use domain::Destination;
use serde_json::Value;

use super::{ChatEventHandler, DisconnectedContext, ReceiptContext};
use crate::rate_limiter::RateLimiter;

/// 刷屏处理器：被禁言用户的消息照常入库，但只回给发送者本人
pub struct AntiFloodHandler {
    limiter: Arc<RateLimiter>,
}

impl AntiFloodHandler {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl ChatEventHandler for AntiFloodHandler {
    fn name(&self) -> &'static str {
        "anti_flood"
    }

    async fn on_message_received(&self, ctx: &mut ReceiptContext) -> anyhow::Result<()> {
        let user_id = ctx.message.sender.user_id.as_str();
        if self.limiter.record_and_check(user_id, ctx.message.timestamp) {
            return Ok(());
        }

        tracing::debug!(user_id, "Message from jailed user limited to sender");
        ctx.destination = Destination::SELF;
        ctx.message.metadata.insert("flood".into(), Value::Bool(true));
        ctx.sync_delivery_metadata();
        Ok(())
    }

    async fn on_disconnected(&self, ctx: &DisconnectedContext) -> anyhow::Result<()> {
        if let Some(user) = &ctx.user {
            self.limiter.release(&user.user_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use chrono::Utc;
    use config::{ChatSettings, SettingsProvider};
    use domain::{ChatMessage, ChatMessageDto, ConnectionId, UserInfo};

    fn receipt(at: chrono::DateTime<Utc>) -> ReceiptContext {
        let message = ChatMessage::new("lobby", at, "spam", UserInfo::new("alice", Value::Null));
        ReceiptContext {
            connection_id: ConnectionId::new(1),
            delivery: ChatMessageDto::from_history(&message),
            message,
            destination: Destination::ALL,
        }
    }

    #[tokio::test]
    async fn jailed_sender_is_narrowed_and_tagged() {
        let provider = SettingsProvider::from_settings(ChatSettings {
            window_number_of_messages: 1,
            ..ChatSettings::default()
        });
        let clock = Arc::new(ManualClock::default());
        let handler = AntiFloodHandler::new(Arc::new(RateLimiter::new(
            provider.subscribe(),
            clock.clone(),
        )));

        let mut first = receipt(clock.now());
        handler.on_message_received(&mut first).await.unwrap();
        assert_eq!(first.destination, Destination::ALL);
        assert!(!first.message.is_flagged_as_flood());

        let mut second = receipt(clock.now());
        handler.on_message_received(&mut second).await.unwrap();
        assert_eq!(second.destination, Destination::SELF);
        assert!(second.message.is_flagged_as_flood());
        assert_eq!(second.delivery.metadata, r#"{"flood":true}"#);
    }
}
