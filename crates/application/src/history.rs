//! 历史查询：合并内存缓存与持久化存储
//!
//! 以缓存中最早一条消息的时间为界，界前查存储，界后扫缓存，
//! 两边结果拼接后按时间升序排序。

use std::sync::Arc;

use chrono::DateTime;
use domain::{ChatMessage, DurableStore, RangeQuery, RepositoryResult, Timestamp};

use crate::clock::Clock;
use crate::error::{ChatError, ChatResult};
use crate::message_cache::MessageCache;

/// 经过校验的查询区间，`start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl HistoryRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        if end < start {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    /// 由客户端传入的 Unix 秒构造
    pub fn from_unix_seconds(start: i64, end: i64) -> ChatResult<Self> {
        let start = DateTime::from_timestamp(start, 0)
            .ok_or_else(|| ChatError::validation(format!("start {start} is out of range")))?;
        let end = DateTime::from_timestamp(end, 0)
            .ok_or_else(|| ChatError::validation(format!("end {end} is out of range")))?;
        Ok(Self::new(start, end))
    }
}

pub struct HistoryQueryEngine {
    cache: Arc<MessageCache>,
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
}

impl HistoryQueryEngine {
    pub fn new(
        cache: Arc<MessageCache>,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            store,
            clock,
        }
    }

    pub async fn seek_history(
        &self,
        channel: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> RepositoryResult<Vec<ChatMessage>> {
        let HistoryRange { start, end } = HistoryRange::new(start, end);
        let boundary = self
            .cache
            .oldest_timestamp()
            .unwrap_or_else(|| self.clock.now());

        let mut messages = Vec::new();
        if boundary > start {
            let query = RangeQuery::new(channel, start, end.min(boundary));
            messages = self.store.range_query(&query).await?;
        }
        let durable = messages.len();

        if boundary <= end {
            messages.extend(self.cache.scan(channel, start.max(boundary), end));
        }

        tracing::debug!(
            channel,
            durable,
            cached = messages.len() - durable,
            "History query answered"
        );

        messages.sort_by_key(|message| message.timestamp);
        Ok(messages)
    }
}
