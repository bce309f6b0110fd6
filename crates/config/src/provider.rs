//! 配置变更通知
//!
//! 使用 `tokio::sync::watch` 向各组件推送最新的配置快照，
//! 组件在使用时读取当前值即可感知热更新。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::watch;

use crate::{AppConfig, ChatSettings, ConfigError, FallbackReason, RawChatSettings};

/// 聊天配置提供者
#[derive(Debug)]
pub struct SettingsProvider {
    sender: watch::Sender<ChatSettings>,
}

impl SettingsProvider {
    /// 解析原始配置并记录所有回退到默认值的配置项
    pub fn new(raw: &RawChatSettings) -> Self {
        let (sender, _) = watch::channel(resolve_and_log(raw));
        Self { sender }
    }

    /// 直接使用已解析的配置（测试或嵌入场景）
    pub fn from_settings(settings: ChatSettings) -> Self {
        let (sender, _) = watch::channel(settings);
        Self { sender }
    }

    pub fn current(&self) -> ChatSettings {
        self.sender.borrow().clone()
    }

    /// 订阅配置变更
    pub fn subscribe(&self) -> watch::Receiver<ChatSettings> {
        self.sender.subscribe()
    }

    /// 应用新的原始配置并通知所有订阅者
    pub fn update(&self, raw: &RawChatSettings) -> ChatSettings {
        let settings = resolve_and_log(raw);
        self.set(settings.clone());
        settings
    }

    pub fn set(&self, settings: ChatSettings) {
        self.sender.send_replace(settings);
        tracing::info!("Chat settings updated");
    }

    /// 监听配置文件，文件修改后重新加载并推送新配置
    ///
    /// 返回的句柄被丢弃时停止监听。
    pub fn watch_file(
        self: &Arc<Self>,
        path: impl AsRef<Path>,
    ) -> Result<ConfigWatcher, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let provider = Arc::clone(self);
        let reload_path = path.clone();

        let mut watcher = recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                match AppConfig::from_file(&reload_path) {
                    Ok(cfg) => {
                        provider.update(&cfg.chat_configuration);
                    }
                    Err(err) => {
                        tracing::error!(
                            path = %reload_path.display(),
                            error = %err,
                            "Failed to reload chat settings, keeping previous values"
                        );
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "Configuration watcher error");
            }
        })?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Watching chat settings file");
        Ok(ConfigWatcher {
            _watcher: watcher,
            path,
        })
    }
}

impl Default for SettingsProvider {
    fn default() -> Self {
        Self::from_settings(ChatSettings::default())
    }
}

/// 配置文件监听句柄
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl ConfigWatcher {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn resolve_and_log(raw: &RawChatSettings) -> ChatSettings {
    let (settings, fallbacks) = raw.resolve();
    for fallback in fallbacks {
        match fallback.reason {
            FallbackReason::Missing => tracing::warn!(
                key = fallback.key,
                default = %fallback.applied,
                "Failed to find setting in chat_configuration, using default value"
            ),
            FallbackReason::Invalid => tracing::warn!(
                key = fallback.key,
                default = %fallback.applied,
                "Invalid value for setting in chat_configuration, using default value"
            ),
        }
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn subscribers_see_updates() {
        let provider = SettingsProvider::new(&RawChatSettings::default());
        let mut rx = provider.subscribe();
        assert_eq!(rx.borrow().batch_size, 1000);

        provider.update(&RawChatSettings {
            batch_size: Some(10),
            jail_duration: Some(9),
            ..Default::default()
        });

        rx.changed().await.unwrap();
        let settings = rx.borrow().clone();
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.jail_duration, Duration::from_secs(9));
        assert_eq!(provider.current(), settings);
    }

    #[test]
    fn set_without_subscribers_keeps_value() {
        let provider = SettingsProvider::default();
        let mut settings = provider.current();
        settings.history_enabled = true;
        provider.set(settings);
        assert!(provider.current().history_enabled);
    }
}
