//! 批量落盘
//!
//! 同一时刻最多只有一次落盘在进行；并发调用方拿到的是同一个进行中的
//! 句柄。每批写入失败只记录错误，该批消息不会重新入队。

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use config::ChatSettings;
use domain::DurableStore;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::message_cache::MessageCache;

/// 一批写入的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub size: usize,
    /// 写入失败时的错误信息，该批消息已丢弃
    pub error: Option<String>,
}

/// 一次落盘的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub batches: Vec<BatchOutcome>,
}

impl FlushReport {
    pub fn written(&self) -> usize {
        self.batches
            .iter()
            .filter(|batch| batch.error.is_none())
            .map(|batch| batch.size)
            .sum()
    }

    pub fn dropped(&self) -> usize {
        self.batches
            .iter()
            .filter(|batch| batch.error.is_some())
            .map(|batch| batch.size)
            .sum()
    }

    pub fn failed_batches(&self) -> usize {
        self.batches.iter().filter(|batch| batch.error.is_some()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_batches() == 0
    }
}

/// 进行中的落盘句柄，可被多个调用方同时等待
pub type FlushHandle = Shared<BoxFuture<'static, FlushReport>>;

pub struct Flusher {
    cache: Arc<MessageCache>,
    store: Arc<dyn DurableStore>,
    settings: watch::Receiver<ChatSettings>,
    in_flight: Mutex<Option<FlushHandle>>,
}

impl Flusher {
    pub fn new(
        cache: Arc<MessageCache>,
        store: Arc<dyn DurableStore>,
        settings: watch::Receiver<ChatSettings>,
    ) -> Self {
        Self {
            cache,
            store,
            settings,
            in_flight: Mutex::new(None),
        }
    }

    /// 请求一次落盘；已有落盘在进行时返回同一个句柄
    ///
    /// 有 tokio 运行时时落盘在后台任务中推进，调用方不等待句柄也会完成；
    /// 没有运行时时只有等待句柄才会执行，也不会登记为进行中。
    pub fn flush(&self) -> FlushHandle {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = in_flight.as_ref() {
            if handle.peek().is_none() {
                return handle.clone();
            }
        }

        let batch_size = self.settings.borrow().batch_size.max(1);
        let handle = drain(self.cache.clone(), self.store.clone(), batch_size)
            .boxed()
            .shared();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(handle.clone());
                *in_flight = Some(handle.clone());
            }
            Err(_) => {
                // 无人推进的句柄不能占住单飞位置
                tracing::debug!("No runtime available, flush runs when awaited");
            }
        }
        handle
    }

    /// 反复落盘直到队列清空，或某一轮没有取出任何消息
    ///
    /// 先等待进行中的落盘，再补写它开始之后追加的消息。停止前使用。
    pub async fn flush_all(&self) -> FlushReport {
        let mut report = FlushReport::default();
        loop {
            let pass = self.flush().await;
            let progressed = !pass.batches.is_empty();
            report.batches.extend(pass.batches);
            if self.cache.is_empty() || !progressed {
                break;
            }
        }
        report
    }

    pub fn is_flushing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| handle.peek().is_none())
    }
}

/// 按开始时的队列长度切分批次，逐批顺序写入
async fn drain(
    cache: Arc<MessageCache>,
    store: Arc<dyn DurableStore>,
    batch_size: usize,
) -> FlushReport {
    let mut remaining = cache.len();
    let mut report = FlushReport::default();

    while remaining > 0 {
        let batch = cache.dequeue_batch(batch_size.min(remaining));
        if batch.is_empty() {
            break;
        }
        remaining -= batch.len();

        let started = Instant::now();
        let outcome = match store.bulk_write(&batch).await {
            Ok(()) => {
                tracing::info!(
                    batch_size = batch.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Chat log batch persisted"
                );
                BatchOutcome {
                    size: batch.len(),
                    error: None,
                }
            }
            Err(err) => {
                tracing::error!(
                    batch_size = batch.len(),
                    dropped = batch.len(),
                    error = %err,
                    "Failed to persist chat log batch, messages dropped"
                );
                BatchOutcome {
                    size: batch.len(),
                    error: Some(err.to_string()),
                }
            }
        };
        report.batches.push(outcome);
    }

    report
}

/// 周期性落盘任务；取消后再做最后一次落盘，返回其结果
pub fn spawn_flush_schedule(
    flusher: Arc<Flusher>,
    settings: watch::Receiver<ChatSettings>,
    token: CancellationToken,
) -> JoinHandle<FlushReport> {
    tokio::spawn(async move {
        loop {
            let interval = settings.borrow().flush_interval;
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    let report = flusher.flush().await;
                    if !report.is_success() {
                        tracing::error!(
                            failed_batches = report.failed_batches(),
                            dropped = report.dropped(),
                            "Scheduled flush completed with errors"
                        );
                    }
                }
            }
        }

        tracing::info!("Flush schedule stopped, running final flush");
        flusher.flush_all().await
    })
}
