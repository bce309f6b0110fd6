//! 内存聊天记录存储，未配置数据库时使用
//!
//! 与 PostgreSQL 存储相同的周分区与分页语义，游标是结果中的偏移量。

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use domain::{
    week_bucket, ChatMessage, DurableStore, RangePage, RangeQuery, RepositoryError,
    RepositoryResult,
};

use crate::repository::RANGE_PAGE_SIZE;

pub struct InMemoryChatLogStore {
    /// channel -> week bucket -> 按写入顺序的消息
    channels: DashMap<String, BTreeMap<i64, Vec<ChatMessage>>>,
    page_size: usize,
}

impl InMemoryChatLogStore {
    pub fn new() -> Self {
        Self::with_page_size(RANGE_PAGE_SIZE as usize)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            channels: DashMap::new(),
            page_size: page_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.channels
            .iter()
            .map(|channel| channel.values().map(Vec::len).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryChatLogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for InMemoryChatLogStore {
    async fn bulk_write(&self, batch: &[ChatMessage]) -> RepositoryResult<()> {
        for message in batch {
            self.channels
                .entry(message.channel.clone())
                .or_default()
                .entry(week_bucket(message.timestamp))
                .or_default()
                .push(message.clone());
        }
        Ok(())
    }

    async fn range_query_page(
        &self,
        query: &RangeQuery,
        cursor: Option<String>,
    ) -> RepositoryResult<RangePage> {
        let offset = match cursor {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| RepositoryError::invalid_data(format!("malformed cursor `{raw}`")))?,
            None => 0,
        };

        let mut matching: Vec<ChatMessage> = match self.channels.get(&query.channel) {
            Some(buckets) => buckets
                .range(query.buckets.clone())
                .flat_map(|(_, messages)| messages.iter())
                .filter(|message| query.contains(message))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        matching.sort_by_key(|message| message.timestamp);

        let end = (offset + self.page_size).min(matching.len());
        let messages = matching.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_cursor = (end < matching.len()).then(|| end.to_string());

        Ok(RangePage {
            messages,
            next_cursor,
        })
    }
}
