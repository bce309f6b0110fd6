//! 频道聊天服务
//!
//! 每个频道一个实例；同一进程内的所有频道共享一个 `ChatLog`。

use std::sync::Arc;

use config::ChatSettings;
use domain::{
    ChatMessage, ChatMessageDto, ChatUserInfoDto, ConnectionId, ConnectionStatus, DomainError,
    IdentityResolver, PresenceEntry, Timestamp,
};
use tokio::sync::watch;

use crate::bus::{MessageBus, Subscription};
use crate::chat_log::ChatLog;
use crate::clock::Clock;
use crate::delivery::{DeliverySink, StatusChange};
use crate::error::{ChatError, ChatResult};
use crate::handlers::{
    ChatEventHandler, DisconnectedContext, HandlerChain, HandlerPolicy, LifecycleContext,
};
use crate::history::HistoryRange;
use crate::pipeline::{MessagePipeline, ReceiveOutcome};
use crate::presence::PresenceRegistry;

pub struct ChatServiceDependencies {
    pub identity: Arc<dyn IdentityResolver>,
    pub chat_log: Arc<ChatLog>,
    pub delivery: Arc<dyn DeliverySink>,
    pub handlers: Vec<Arc<dyn ChatEventHandler>>,
    pub clock: Arc<dyn Clock>,
}

pub struct ChatService {
    identity: Arc<dyn IdentityResolver>,
    settings: watch::Receiver<ChatSettings>,
    pipeline: MessagePipeline,
}

impl ChatService {
    pub fn new(channel: impl Into<String>, deps: ChatServiceDependencies) -> Self {
        let settings = deps.chat_log.settings();
        Self {
            identity: deps.identity,
            settings,
            pipeline: MessagePipeline {
                channel: channel.into(),
                presence: Arc::new(PresenceRegistry::new()),
                handlers: HandlerChain::new(deps.handlers),
                chat_log: deps.chat_log,
                bus: MessageBus::new(),
                delivery: deps.delivery,
                clock: deps.clock,
            },
        }
    }

    pub fn channel(&self) -> &str {
        &self.pipeline.channel
    }

    fn lifecycle_context(&self) -> LifecycleContext {
        LifecycleContext {
            channel: self.pipeline.channel.clone(),
            bus: self.pipeline.bus.clone(),
        }
    }

    /// 运行所有处理器的初始化钩子，出错只记录
    pub async fn initialize(&self) {
        let _ = self
            .pipeline
            .handlers
            .run_init(&self.lifecycle_context(), HandlerPolicy::LogAndContinue)
            .await;
    }

    pub async fn shutdown(&self) {
        let _ = self
            .pipeline
            .handlers
            .run_shutdown(&self.lifecycle_context(), HandlerPolicy::LogAndContinue)
            .await;
    }

    /// 新连接：解析身份，成功后向频道广播在线列表
    ///
    /// 同一个连接重复调用会被忽略。解析失败时移除记录，只通知该连接。
    pub async fn on_connect(&self, connection_id: ConnectionId) -> ChatResult<()> {
        let presence = &self.pipeline.presence;
        if !presence.begin_connect(connection_id) {
            tracing::debug!(connection_id = %connection_id, "Connection already registered");
            return Ok(());
        }

        let resolved = match self.identity.resolve(connection_id).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(DomainError::identity_error(format!(
                "no session for connection {connection_id}"
            ))),
            Err(err) => Err(err),
        };

        match resolved {
            Ok(user) => {
                let user_id = user.user_id.clone();
                presence.complete_connect(connection_id, user);
                tracing::info!(
                    channel = %self.pipeline.channel,
                    connection_id = %connection_id,
                    user_id = %user_id,
                    "User connected"
                );

                let change = StatusChange::Connected {
                    users: presence.connected_users(),
                };
                if let Err(err) = self
                    .pipeline
                    .delivery
                    .broadcast_status(&self.pipeline.channel, &change)
                    .await
                {
                    tracing::warn!(error = %err, "Failed to broadcast status change");
                }
                Ok(())
            }
            Err(err) => {
                presence.remove(connection_id);
                tracing::warn!(
                    connection_id = %connection_id,
                    error = %err,
                    "Failed to resolve connection identity"
                );

                let mut failed = PresenceEntry::connecting(connection_id);
                failed.status = ConnectionStatus::Error;
                let change = StatusChange::Error {
                    user: failed.to_dto(),
                };
                if let Err(send_err) = self
                    .pipeline
                    .delivery
                    .send_status(connection_id, &change)
                    .await
                {
                    tracing::warn!(error = %send_err, "Failed to notify connection of error");
                }
                Err(ChatError::Identity(err))
            }
        }
    }

    pub async fn on_disconnect(&self, connection_id: ConnectionId) -> ChatResult<()> {
        let entry = self
            .pipeline
            .presence
            .remove(connection_id)
            .ok_or(ChatError::NotConnected(connection_id))?;

        let mut user = entry.to_dto();
        user.status = ConnectionStatus::Disconnected;
        tracing::info!(
            channel = %self.pipeline.channel,
            connection_id = %connection_id,
            user_id = %user.user_id,
            "User disconnected"
        );

        let change = StatusChange::Disconnected { user };
        if let Err(err) = self
            .pipeline
            .delivery
            .broadcast_status(&self.pipeline.channel, &change)
            .await
        {
            tracing::warn!(error = %err, "Failed to broadcast status change");
        }

        let ctx = DisconnectedContext {
            channel: self.pipeline.channel.clone(),
            connection_id,
            user: entry.user,
        };
        self.pipeline
            .handlers
            .run_disconnected(&ctx, HandlerPolicy::AbortOnError)
            .await
    }

    pub async fn submit_message(
        &self,
        sender: ConnectionId,
        text: &str,
    ) -> ChatResult<ReceiveOutcome> {
        self.pipeline.receive(sender, text).await
    }

    pub async fn query_history(
        &self,
        channel: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> ChatResult<Vec<ChatMessage>> {
        if !self.settings.borrow().history_enabled {
            return Err(ChatError::HistoryDisabled);
        }
        if channel.is_empty() {
            return Err(ChatError::validation("channel must not be empty"));
        }

        let messages = self
            .pipeline
            .chat_log
            .seek_history(channel, start, end)
            .await
            .inspect_err(|err| {
                tracing::error!(channel, error = %err, "History query failed");
            })?;
        Ok(messages)
    }

    /// 本频道的历史，转换为推送表示
    pub async fn load_history_dtos(&self, range: HistoryRange) -> ChatResult<Vec<ChatMessageDto>> {
        let messages = self
            .query_history(&self.pipeline.channel, range.start, range.end)
            .await?;
        Ok(messages.iter().map(ChatMessageDto::from_history).collect())
    }

    pub fn get_connected_users(&self) -> Vec<ChatUserInfoDto> {
        self.pipeline.presence.connected_users()
    }

    pub fn on_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.pipeline.bus.subscribe(callback)
    }
}
