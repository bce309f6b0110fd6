//! 基础设施层实现。
//!
//! 提供聊天记录存储（PostgreSQL / 内存）、会话身份表与进程内投递中心，
//! 实现应用/领域层定义的接口。

pub mod broadcast;
pub mod builder;
pub mod identity;
pub mod memory;
pub mod migrations;
pub mod repository;

pub use broadcast::{
    ConnectionStream, DeliveryEnvelope, DeliveryTarget, LocalDeliveryHub, Outbound,
};
pub use builder::{Infrastructure, InfrastructureConfig, InfrastructureError};
pub use identity::SessionIdentityResolver;
pub use memory::InMemoryChatLogStore;
pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgChatLogStore, RANGE_PAGE_SIZE};
