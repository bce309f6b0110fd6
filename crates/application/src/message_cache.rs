//! 待持久化消息的内存队列
//!
//! 生产者只做一次短暂的入队，不会被持久化阻塞；历史查询拿到的是
//! 调用时刻的快照。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use domain::{ChatMessage, Timestamp};

#[derive(Debug, Default)]
pub struct MessageCache {
    queue: Mutex<VecDeque<Arc<ChatMessage>>>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Arc<ChatMessage>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 入队并返回入队后的长度
    pub fn append(&self, message: ChatMessage) -> usize {
        let mut queue = self.queue();
        queue.push_back(Arc::new(message));
        queue.len()
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    /// 缓存边界：最早一条仍在内存中的消息时间
    pub fn oldest_timestamp(&self) -> Option<Timestamp> {
        self.queue().front().map(|message| message.timestamp)
    }

    /// 从队头取出至多 `max` 条消息
    pub fn dequeue_batch(&self, max: usize) -> Vec<ChatMessage> {
        let mut queue = self.queue();
        let take = max.min(queue.len());
        queue.drain(..take).map(Arc::unwrap_or_clone).collect()
    }

    /// 当前内容的快照，过滤在锁外进行
    pub fn snapshot(&self) -> Vec<Arc<ChatMessage>> {
        self.queue().iter().cloned().collect()
    }

    /// 频道内时间落在 `[start, end]` 的消息，按入队顺序
    pub fn scan(&self, channel: &str, start: Timestamp, end: Timestamp) -> Vec<ChatMessage> {
        self.snapshot()
            .into_iter()
            .filter(|message| {
                message.channel == channel && message.timestamp >= start && message.timestamp <= end
            })
            .map(|message| message.as_ref().clone())
            .collect()
    }
}
