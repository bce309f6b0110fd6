//! 刷屏检测与临时禁言
//!
//! 每个用户维护一个最近消息时间戳的滑动窗口；窗口内消息数超过
//! `window_number_of_messages` 时禁言 `jail_duration`。禁言期间的消息
//! 仍会入库，只是投递范围被收窄到发送者本人。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use config::ChatSettings;
use dashmap::DashMap;
use domain::{JailEntry, Timestamp};
use tokio::sync::watch;

use crate::clock::Clock;

/// 消息限流器
pub struct RateLimiter {
    /// 每个用户最近的消息时间戳（按到达顺序）
    windows: DashMap<String, VecDeque<Timestamp>>,
    jail: DashMap<String, JailEntry>,
    settings: watch::Receiver<ChatSettings>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(settings: watch::Receiver<ChatSettings>, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            jail: DashMap::new(),
            settings,
            clock,
        }
    }

    /// 记录一条消息并返回该消息是否可以正常投递
    ///
    /// 返回值只反映当前的禁言状态：越过阈值的那条消息本身就会被限制，
    /// 之前的消息不受影响。
    pub fn record_and_check(&self, user_id: &str, message_time: Timestamp) -> bool {
        let (window, limit, jail_duration) = {
            let settings = self.settings.borrow();
            (
                to_chrono(settings.window_duration),
                settings.window_number_of_messages,
                settings.jail_duration,
            )
        };

        let in_window = {
            let mut timestamps = self.windows.entry(user_id.to_string()).or_default();
            timestamps.push_back(message_time);
            while let Some(&oldest) = timestamps.front() {
                if message_time - oldest > window {
                    timestamps.pop_front();
                } else {
                    break;
                }
            }
            timestamps.len()
        };

        if in_window > limit {
            tracing::warn!(
                user_id,
                messages = in_window,
                limit,
                "Flood detected, jailing user"
            );
            self.jail(user_id, jail_duration);
        }

        !self.is_jailed(user_id)
    }

    /// 禁言用户；已有禁言时只会延长，不会缩短
    pub fn jail(&self, user_id: &str, duration: Duration) {
        let release_time = self.clock.now() + to_chrono(duration);
        self.jail
            .entry(user_id.to_string())
            .and_modify(|entry| entry.extend_to(release_time))
            .or_insert_with(|| JailEntry::new(user_id, release_time));
    }

    /// 查询禁言状态，顺带清理已过期的记录
    pub fn is_jailed(&self, user_id: &str) -> bool {
        let now = self.clock.now();
        let active = self.jail.get(user_id).map(|entry| entry.is_active(now));
        match active {
            Some(true) => true,
            Some(false) => {
                self.jail.remove_if(user_id, |_, entry| !entry.is_active(now));
                false
            }
            None => false,
        }
    }

    /// 解除禁言并清空该用户的窗口（断开连接时调用）
    pub fn release(&self, user_id: &str) {
        if self.jail.remove(user_id).is_some() {
            tracing::debug!(user_id, "Jail entry released");
        }
        self.windows.remove(user_id);
    }

    pub fn jail_entry(&self, user_id: &str) -> Option<JailEntry> {
        self.jail.get(user_id).map(|entry| entry.clone())
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use config::SettingsProvider;

    fn limiter(limit: usize) -> (RateLimiter, Arc<ManualClock>) {
        let provider = SettingsProvider::from_settings(ChatSettings {
            window_number_of_messages: limit,
            window_duration: Duration::from_secs(5),
            jail_duration: Duration::from_secs(3),
            ..ChatSettings::default()
        });
        let clock = Arc::new(ManualClock::default());
        (RateLimiter::new(provider.subscribe(), clock.clone()), clock)
    }

    #[test]
    fn message_crossing_threshold_is_limited() {
        let (limiter, clock) = limiter(3);
        let now = clock.now();
        for i in 0..3 {
            assert!(limiter.record_and_check("alice", now + chrono::Duration::milliseconds(i)));
        }
        assert!(!limiter.record_and_check("alice", now + chrono::Duration::milliseconds(3)));
        assert!(limiter.is_jailed("alice"));
        assert!(!limiter.is_jailed("bob"));
    }

    #[test]
    fn old_timestamps_slide_out_of_window() {
        let (limiter, clock) = limiter(2);
        let now = clock.now();
        assert!(limiter.record_and_check("alice", now));
        assert!(limiter.record_and_check("alice", now + chrono::Duration::seconds(1)));
        assert!(limiter.record_and_check("alice", now + chrono::Duration::seconds(7)));
        assert!(limiter.jail_entry("alice").is_none());
    }

    #[test]
    fn jail_only_extends() {
        let (limiter, clock) = limiter(10);
        limiter.jail("alice", Duration::from_secs(1));
        limiter.jail("alice", Duration::from_secs(10));
        limiter.jail("alice", Duration::from_secs(1));
        let entry = limiter.jail_entry("alice").unwrap();
        assert_eq!(entry.release_time, clock.now() + chrono::Duration::seconds(10));
    }

    #[test]
    fn expired_entries_are_removed_on_lookup() {
        let (limiter, clock) = limiter(10);
        limiter.jail("alice", Duration::from_secs(3));
        assert!(limiter.is_jailed("alice"));
        clock.advance(Duration::from_secs(3));
        assert!(!limiter.is_jailed("alice"));
        assert!(limiter.jail_entry("alice").is_none());
    }

    #[test]
    fn release_forgets_ban_and_window() {
        let (limiter, clock) = limiter(1);
        let now = clock.now();
        limiter.record_and_check("alice", now);
        assert!(!limiter.record_and_check("alice", now));
        limiter.release("alice");
        assert!(!limiter.is_jailed("alice"));
        assert!(limiter.record_and_check("alice", now));
    }
}
