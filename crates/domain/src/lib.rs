//! 聊天核心领域模型
//!
//! 包含聊天消息、在线状态、禁言记录等核心数据结构，
//! 以及持久化存储、身份解析等外部协作方的抽象接口。

pub mod destination;
pub mod errors;
pub mod jail;
pub mod message;
pub mod presence;
pub mod repository;
pub mod value_objects;

// 重新导出常用类型
pub use destination::Destination;
pub use errors::*;
pub use jail::JailEntry;
pub use message::{ChatMessage, ChatMessageDto, ChatUserInfoDto, Metadata, UserInfo};
pub use presence::{ConnectionStatus, PresenceEntry};
pub use repository::{DurableStore, IdentityResolver, RangePage, RangeQuery, RepositoryResult};
pub use value_objects::{
    to_storage_precision, week_bucket, week_range, ConnectionId, Timestamp, WEEK_MILLIS,
};

#[cfg(feature = "testing")]
pub use repository::{MockDurableStore, MockIdentityResolver};
