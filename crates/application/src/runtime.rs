//! 服务的启动与停止
//!
//! `start` 运行初始化钩子并启动定时落盘；`stop` 取消定时任务、等待最后一次
//! 落盘、再运行关闭钩子。最后一次落盘失败或仍有消息未写入时只记录错误，
//! 不阻止退出。

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::chat_log::ChatLog;
use crate::error::ChatError;
use crate::flusher::{spawn_flush_schedule, FlushReport};
use crate::service::ChatService;

#[derive(Debug)]
pub struct ShutdownReport {
    pub final_flush: FlushReport,
    /// 最后一次落盘后仍留在队列中的消息数
    pub pending: usize,
    pub error: Option<ChatError>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.pending == 0
    }
}

pub struct ChatRuntime {
    chat_log: Arc<ChatLog>,
    services: Vec<Arc<ChatService>>,
    token: CancellationToken,
    scheduler: JoinHandle<FlushReport>,
}

impl ChatRuntime {
    pub async fn start(chat_log: Arc<ChatLog>, services: Vec<Arc<ChatService>>) -> Self {
        for service in &services {
            service.initialize().await;
        }

        let token = CancellationToken::new();
        let scheduler =
            spawn_flush_schedule(chat_log.flusher(), chat_log.settings(), token.clone());
        tracing::info!(channels = services.len(), "Chat runtime started");

        Self {
            chat_log,
            services,
            token,
            scheduler,
        }
    }

    pub fn services(&self) -> &[Arc<ChatService>] {
        &self.services
    }

    pub async fn stop(self) -> ShutdownReport {
        self.token.cancel();

        let final_flush = match self.scheduler.await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(error = %err, "Flush schedule task failed, flushing directly");
                self.chat_log.flush_all().await
            }
        };

        let pending = self.chat_log.pending();
        let error = if !final_flush.is_success() {
            Some(ChatError::Shutdown(format!(
                "final flush dropped {} messages in {} batches",
                final_flush.dropped(),
                final_flush.failed_batches()
            )))
        } else if pending > 0 {
            Some(ChatError::Shutdown(format!(
                "{pending} messages still pending after final flush"
            )))
        } else {
            None
        };
        if let Some(err) = &error {
            tracing::error!(error = %err, "Final flush failed, shutting down anyway");
        }

        for service in &self.services {
            service.shutdown().await;
        }

        tracing::info!(
            written = final_flush.written(),
            pending,
            "Chat runtime stopped"
        );
        ShutdownReport {
            final_flush,
            pending,
            error,
        }
    }
}
