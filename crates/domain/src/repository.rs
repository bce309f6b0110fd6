//! 外部协作方接口
//!
//! 持久化存储与身份解析由外层实现，核心只依赖这里的抽象。

use std::ops::RangeInclusive;

use async_trait::async_trait;

use crate::errors::{DomainResult, RepositoryError};
use crate::message::{ChatMessage, UserInfo};
use crate::value_objects::{week_range, ConnectionId, Timestamp};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// 一次按时间范围的历史查询，覆盖 `[start, end]` 以及其间所有周分区
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    pub channel: String,
    pub buckets: RangeInclusive<i64>,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl RangeQuery {
    pub fn new(channel: impl Into<String>, start: Timestamp, end: Timestamp) -> Self {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        Self {
            channel: channel.into(),
            buckets: week_range(start, end),
            start,
            end,
        }
    }

    pub fn contains(&self, message: &ChatMessage) -> bool {
        message.channel == self.channel
            && message.timestamp >= self.start
            && message.timestamp <= self.end
    }
}

/// 分页查询的一页结果；`next_cursor` 为空表示没有更多数据
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangePage {
    pub messages: Vec<ChatMessage>,
    pub next_cursor: Option<String>,
}

/// 持久化聊天记录存储（按周分区）
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// 批量写入一批消息
    async fn bulk_write(&self, batch: &[ChatMessage]) -> RepositoryResult<()>;

    /// 读取一页范围查询结果，`cursor` 来自上一页的 `next_cursor`
    async fn range_query_page(
        &self,
        query: &RangeQuery,
        cursor: Option<String>,
    ) -> RepositoryResult<RangePage>;

    /// 读取完整范围，按时间升序
    async fn range_query(&self, query: &RangeQuery) -> RepositoryResult<Vec<ChatMessage>> {
        let mut messages = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.range_query_page(query, cursor).await?;
            messages.extend(page.messages);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(messages)
    }
}

/// 连接到用户身份的解析
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// 找不到会话时返回 `Ok(None)`
    async fn resolve(&self, connection_id: ConnectionId) -> DomainResult<Option<UserInfo>>;
}
