//! 写后缓存的聊天记录
//!
//! 新消息先进入内存队列，由落盘任务（定时或队列过长时）批量写入存储。

use std::sync::Arc;

use config::ChatSettings;
use domain::{ChatMessage, DurableStore, RepositoryResult, Timestamp};
use tokio::sync::watch;

use crate::clock::Clock;
use crate::flusher::{FlushHandle, FlushReport, Flusher};
use crate::history::HistoryQueryEngine;
use crate::message_cache::MessageCache;

pub struct ChatLog {
    cache: Arc<MessageCache>,
    flusher: Arc<Flusher>,
    history: HistoryQueryEngine,
    settings: watch::Receiver<ChatSettings>,
}

impl ChatLog {
    pub fn new(
        store: Arc<dyn DurableStore>,
        settings: watch::Receiver<ChatSettings>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(MessageCache::new());
        let flusher = Arc::new(Flusher::new(
            cache.clone(),
            store.clone(),
            settings.clone(),
        ));
        let history = HistoryQueryEngine::new(cache.clone(), store, clock);
        Self {
            cache,
            flusher,
            history,
            settings,
        }
    }

    /// 追加一条记录；队列达到上限时触发一次后台落盘，本身从不阻塞
    pub fn add_message_log(&self, message: ChatMessage) {
        let len = self.cache.append(message);
        let limit = self.settings.borrow().max_chat_log_size;
        if len >= limit {
            tracing::debug!(pending = len, limit, "Chat log reached size limit, flushing");
            let _ = self.flusher.flush();
        }
    }

    pub async fn seek_history(
        &self,
        channel: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> RepositoryResult<Vec<ChatMessage>> {
        self.history.seek_history(channel, start, end).await
    }

    pub fn flush(&self) -> FlushHandle {
        self.flusher.flush()
    }

    /// 写完队列中的全部消息（包括进行中落盘开始后追加的）
    pub async fn flush_all(&self) -> FlushReport {
        self.flusher.flush_all().await
    }

    pub fn flusher(&self) -> Arc<Flusher> {
        self.flusher.clone()
    }

    pub fn settings(&self) -> watch::Receiver<ChatSettings> {
        self.settings.clone()
    }

    pub fn pending(&self) -> usize {
        self.cache.len()
    }
}
