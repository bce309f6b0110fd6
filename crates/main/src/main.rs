//! 聊天核心服务入口
//!
//! 加载配置，组装存储与各频道的聊天服务，运行到收到退出信号为止。
//! 退出前会做最后一次落盘。

use std::path::PathBuf;
use std::sync::Arc;

use application::{
    AntiFloodHandler, ChatEventHandler, ChatLog, ChatRuntime, ChatService,
    ChatServiceDependencies, Clock, RateLimiter, SystemClock,
};
use config::{AppConfig, SettingsProvider};
use domain::DurableStore;
use infrastructure::{Infrastructure, InfrastructureConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitize(), "Configuration loaded");

    let settings = Arc::new(SettingsProvider::new(&config.chat_configuration));
    let _watcher = match std::env::var_os("CHAT_CONFIG_FILE") {
        Some(path) => match settings.watch_file(PathBuf::from(path)) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                tracing::warn!(error = %err, "Chat settings hot reload disabled");
                None
            }
        },
        None => None,
    };

    let infra = Infrastructure::connect(InfrastructureConfig::from(&config.storage)).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn DurableStore> = infra.store.clone();
    let chat_log = Arc::new(ChatLog::new(store, settings.subscribe(), clock.clone()));
    let services = build_services(&config.channels, &infra, &chat_log, &settings, &clock);

    let runtime = ChatRuntime::start(chat_log, services).await;
    tracing::info!(channels = ?config.channels, "Chat core running");

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    let report = runtime.stop().await;
    if let Some(err) = &report.error {
        tracing::error!(error = %err, "Shutdown completed with errors");
    }
    tracing::info!(
        written = report.final_flush.written(),
        dropped = report.final_flush.dropped(),
        pending = report.pending,
        "Chat core stopped"
    );
    Ok(())
}

/// 每个频道一个服务和一个独立的限流器，所有频道共享同一个 `ChatLog`
fn build_services(
    channels: &[String],
    infra: &Infrastructure,
    chat_log: &Arc<ChatLog>,
    settings: &SettingsProvider,
    clock: &Arc<dyn Clock>,
) -> Vec<Arc<ChatService>> {
    channels
        .iter()
        .map(|channel| {
            let limiter = Arc::new(RateLimiter::new(settings.subscribe(), clock.clone()));
            let handlers: Vec<Arc<dyn ChatEventHandler>> =
                vec![Arc::new(AntiFloodHandler::new(limiter))];
            Arc::new(ChatService::new(
                channel.as_str(),
                ChatServiceDependencies {
                    identity: infra.identity.clone(),
                    chat_log: chat_log.clone(),
                    delivery: infra.delivery.clone(),
                    handlers,
                    clock: clock.clone(),
                },
            ))
        })
        .collect()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
