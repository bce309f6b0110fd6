#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use application::{
    ChatEventHandler, ChatLog, ChatService, ChatServiceDependencies, DeliveryError, DeliverySink,
    ManualClock, RateLimiter, AntiFloodHandler, StatusChange,
};
use async_trait::async_trait;
use config::{ChatSettings, SettingsProvider};
use domain::{
    ChatMessage, ChatMessageDto, ConnectionId, Destination, DomainResult, DurableStore,
    IdentityResolver, RangePage, RangeQuery, RepositoryResult, UserInfo,
};
use serde_json::json;
use tokio::sync::Semaphore;

/// 内存存储，记录每批写入的大小；设置闸门后写入会等待放行
#[derive(Default)]
pub struct MemoryStore {
    pub messages: Mutex<Vec<ChatMessage>>,
    pub batches: Mutex<Vec<usize>>,
    gate: Option<Arc<Semaphore>>,
}

impl MemoryStore {
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                gate: Some(gate.clone()),
                ..Self::default()
            },
            gate,
        )
    }

    pub fn stored_texts(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn bulk_write(&self, batch: &[ChatMessage]) -> RepositoryResult<()> {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        self.batches.lock().unwrap().push(batch.len());
        self.messages.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }

    async fn range_query_page(
        &self,
        query: &RangeQuery,
        _cursor: Option<String>,
    ) -> RepositoryResult<RangePage> {
        let mut messages: Vec<ChatMessage> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| query.contains(m))
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        Ok(RangePage {
            messages,
            next_cursor: None,
        })
    }
}

/// 只认识预先登记过的连接
#[derive(Default)]
pub struct StaticIdentity {
    users: Mutex<HashMap<ConnectionId, UserInfo>>,
}

impl StaticIdentity {
    pub fn register(&self, connection_id: i64, user_id: &str) {
        self.users.lock().unwrap().insert(
            ConnectionId::new(connection_id),
            UserInfo::new(user_id, json!({ "nick": user_id })),
        );
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentity {
    async fn resolve(&self, connection_id: ConnectionId) -> DomainResult<Option<UserInfo>> {
        Ok(self.users.lock().unwrap().get(&connection_id).cloned())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub deliveries: Mutex<Vec<(ConnectionId, ChatMessageDto, Destination)>>,
    pub broadcasts: Mutex<Vec<StatusChange>>,
    pub direct: Mutex<Vec<(ConnectionId, StatusChange)>>,
}

impl RecordingSink {
    pub fn destinations(&self) -> Vec<Destination> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, destination)| *destination)
            .collect()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(
        &self,
        _channel: &str,
        sender: ConnectionId,
        message: &ChatMessageDto,
        destination: Destination,
    ) -> Result<(), DeliveryError> {
        self.deliveries
            .lock()
            .unwrap()
            .push((sender, message.clone(), destination));
        Ok(())
    }

    async fn broadcast_status(
        &self,
        _channel: &str,
        change: &StatusChange,
    ) -> Result<(), DeliveryError> {
        self.broadcasts.lock().unwrap().push(change.clone());
        Ok(())
    }

    async fn send_status(
        &self,
        connection_id: ConnectionId,
        change: &StatusChange,
    ) -> Result<(), DeliveryError> {
        self.direct
            .lock()
            .unwrap()
            .push((connection_id, change.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub provider: SettingsProvider,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub identity: Arc<StaticIdentity>,
    pub sink: Arc<RecordingSink>,
    pub limiter: Arc<RateLimiter>,
    pub chat_log: Arc<ChatLog>,
    pub service: Arc<ChatService>,
}

impl Harness {
    pub fn new(settings: ChatSettings) -> Self {
        Self::with(settings, MemoryStore::default(), Vec::new())
    }

    pub fn with(
        settings: ChatSettings,
        store: MemoryStore,
        extra_handlers: Vec<Arc<dyn ChatEventHandler>>,
    ) -> Self {
        let provider = SettingsProvider::from_settings(settings);
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(store);
        let identity = Arc::new(StaticIdentity::default());
        let sink = Arc::new(RecordingSink::default());
        let limiter = Arc::new(RateLimiter::new(provider.subscribe(), clock.clone()));
        let chat_log = Arc::new(ChatLog::new(
            store.clone(),
            provider.subscribe(),
            clock.clone(),
        ));

        let mut handlers: Vec<Arc<dyn ChatEventHandler>> =
            vec![Arc::new(AntiFloodHandler::new(limiter.clone()))];
        handlers.extend(extra_handlers);

        let service = Arc::new(ChatService::new(
            "lobby",
            ChatServiceDependencies {
                identity: identity.clone(),
                chat_log: chat_log.clone(),
                delivery: sink.clone(),
                handlers,
                clock: clock.clone(),
            },
        ));

        Self {
            provider,
            clock,
            store,
            identity,
            sink,
            limiter,
            chat_log,
            service,
        }
    }

    pub async fn connect(&self, connection_id: i64, user_id: &str) -> ConnectionId {
        self.identity.register(connection_id, user_id);
        let id = ConnectionId::new(connection_id);
        self.service.on_connect(id).await.unwrap();
        id
    }
}
