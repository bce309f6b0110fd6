use serde::{Deserialize, Serialize};

use crate::value_objects::Timestamp;

/// 临时禁言记录
///
/// 禁言生效期间 `release_time` 只会向后推，不会提前。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JailEntry {
    pub user_id: String,
    pub release_time: Timestamp,
}

impl JailEntry {
    pub fn new(user_id: impl Into<String>, release_time: Timestamp) -> Self {
        Self {
            user_id: user_id.into(),
            release_time,
        }
    }

    /// 延长禁言，取两者中较晚的释放时间
    pub fn extend_to(&mut self, release_time: Timestamp) {
        if release_time > self.release_time {
            self.release_time = release_time;
        }
    }

    pub fn is_active(&self, now: Timestamp) -> bool {
        self.release_time > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn extend_never_shortens() {
        let now = Utc::now();
        let mut entry = JailEntry::new("u", now + Duration::seconds(10));
        entry.extend_to(now + Duration::seconds(1));
        assert_eq!(entry.release_time, now + Duration::seconds(10));
        entry.extend_to(now + Duration::seconds(20));
        assert_eq!(entry.release_time, now + Duration::seconds(20));
    }

    #[test]
    fn active_until_release_time() {
        let now = Utc::now();
        let entry = JailEntry::new("u", now + Duration::seconds(3));
        assert!(entry.is_active(now));
        assert!(!entry.is_active(now + Duration::seconds(3)));
    }
}
