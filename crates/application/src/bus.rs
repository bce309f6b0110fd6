//! 进程内消息订阅
//!
//! 订阅者按注册顺序同步回调；取消订阅即从注册表中移除。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use domain::ChatMessage;

type Callback = Arc<dyn Fn(&ChatMessage) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(u64, Callback)>>,
}

#[derive(Clone, Default)]
pub struct MessageBus {
    registry: Arc<Registry>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// 回调在锁外执行，回调内可以安全地订阅或取消订阅
    pub fn publish(&self, message: &ChatMessage) {
        let callbacks: Vec<Callback> = self
            .registry
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback(message);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// 订阅句柄，丢弃时自动取消订阅
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}
