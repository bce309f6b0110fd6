//! 聊天持久化与防刷屏核心。
//!
//! 消息先经过处理器链（含刷屏检测），再进入内存队列并推送给订阅者；
//! 队列由后台任务批量写入按周分区的持久化存储，历史查询合并两边的数据。

pub mod bus;
pub mod chat_log;
pub mod clock;
pub mod delivery;
pub mod error;
pub mod flusher;
pub mod handlers;
pub mod history;
pub mod message_cache;
pub mod pipeline;
pub mod presence;
pub mod rate_limiter;
pub mod runtime;
pub mod service;

pub use bus::{MessageBus, Subscription};
pub use chat_log::ChatLog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use delivery::{DeliveryError, DeliverySink, StatusChange};
pub use error::{ChatError, ChatResult};
pub use flusher::{spawn_flush_schedule, BatchOutcome, FlushHandle, FlushReport, Flusher};
pub use handlers::{
    AntiFloodHandler, ChatEventHandler, DisconnectedContext, HandlerChain, HandlerPolicy,
    LifecycleContext, ReceiptContext,
};
pub use history::{HistoryQueryEngine, HistoryRange};
pub use message_cache::MessageCache;
pub use pipeline::{MessagePipeline, ReceiveOutcome};
pub use presence::PresenceRegistry;
pub use rate_limiter::RateLimiter;
pub use runtime::{ChatRuntime, ShutdownReport};
pub use service::{ChatService, ChatServiceDependencies};
