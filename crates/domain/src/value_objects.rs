use std::fmt;
use std::ops::RangeInclusive;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

/// 一周的毫秒数，持久化存储按周分区。
pub const WEEK_MILLIS: i64 = 7 * 24 * 60 * 60 * 1000;

/// 传输层连接唯一标识。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ConnectionId(pub i64);

impl ConnectionId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ConnectionId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// 计算时间戳所在的周分区编号（自 Unix 纪元起）。
pub fn week_bucket(ts: Timestamp) -> i64 {
    ts.timestamp_millis().div_euclid(WEEK_MILLIS)
}

/// 截断到微秒，与持久化存储（TIMESTAMPTZ）的精度一致。
pub fn to_storage_precision(ts: Timestamp) -> Timestamp {
    ts.trunc_subsecs(6)
}

/// 一个时间区间覆盖的全部周分区，`start` 与 `end` 所在分区都包含在内。
pub fn week_range(start: Timestamp, end: Timestamp) -> RangeInclusive<i64> {
    let (first, last) = (week_bucket(start), week_bucket(end));
    if first <= last {
        first..=last
    } else {
        last..=first
    }
}
