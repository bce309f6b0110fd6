//! 统一配置中心
//!
//! 提供聊天核心的配置管理，包括：
//! - 防刷屏窗口与禁言时长
//! - 消息缓存与批量持久化
//! - 历史查询开关
//! - 持久化存储连接
//!
//! 配置缺失时回退到默认值并记录警告，不会因为缺少配置而启动失败。

mod provider;

pub use provider::{ConfigWatcher, SettingsProvider};

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 默认禁言时长（秒）
pub const DEFAULT_JAIL_DURATION_SECS: u64 = 3;
/// 默认滑动窗口时长（秒）
pub const DEFAULT_WINDOW_DURATION_SECS: u64 = 5;
/// 默认窗口内允许的消息数
pub const DEFAULT_WINDOW_NUMBER_OF_MESSAGES: usize = 10;
/// 默认单批写入条数
pub const DEFAULT_BATCH_SIZE: usize = 1000;
/// 默认触发刷新的缓存条数
pub const DEFAULT_MAX_CHAT_LOG_SIZE: usize = 1000;
/// 默认定时刷新间隔（秒）
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;

/// 配置文件中的原始聊天配置（`chat_configuration` 节），所有字段都可以缺省
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawChatSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jail_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_number_of_messages: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chat_log_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flush_interval_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_enabled: Option<bool>,
}

/// 回退原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// 配置项缺失
    Missing,
    /// 配置值无效（例如为 0）
    Invalid,
}

/// 一个回退到默认值的配置项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsFallback {
    pub key: &'static str,
    pub reason: FallbackReason,
    /// 实际采用的默认值（用于日志）
    pub applied: String,
}

/// 解析后的强类型聊天配置
///
/// | 配置项                        | 单位 | 默认值 |
/// |-------------------------------|------|--------|
/// | `jail_duration`               | 秒 | 3      |
/// | `window_duration`             | 秒 | 5      |
/// | `window_number_of_messages`   | 条 | 10     |
/// | `batch_size`                  | 条 | 1000   |
/// | `max_chat_log_size`           | 条 | 1000   |
/// | `flush_interval_seconds`      | 秒 | 60     |
/// | `history_enabled`             | 布尔 | false  |
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub jail_duration: Duration,
    pub window_duration: Duration,
    pub window_number_of_messages: usize,
    pub batch_size: usize,
    pub max_chat_log_size: usize,
    pub flush_interval: Duration,
    pub history_enabled: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            jail_duration: Duration::from_secs(DEFAULT_JAIL_DURATION_SECS),
            window_duration: Duration::from_secs(DEFAULT_WINDOW_DURATION_SECS),
            window_number_of_messages: DEFAULT_WINDOW_NUMBER_OF_MESSAGES,
            batch_size: DEFAULT_BATCH_SIZE,
            max_chat_log_size: DEFAULT_MAX_CHAT_LOG_SIZE,
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            history_enabled: false,
        }
    }
}

fn positive<T>(
    key: &'static str,
    value: Option<T>,
    default: T,
    fallbacks: &mut Vec<SettingsFallback>,
) -> T
where
    T: PartialOrd + Default + Copy + std::fmt::Display,
{
    match value {
        Some(v) if v > T::default() => v,
        Some(_) => {
            fallbacks.push(SettingsFallback {
                key,
                reason: FallbackReason::Invalid,
                applied: default.to_string(),
            });
            default
        }
        None => {
            fallbacks.push(SettingsFallback {
                key,
                reason: FallbackReason::Missing,
                applied: default.to_string(),
            });
            default
        }
    }
}

impl RawChatSettings {
    /// 解析为强类型配置，返回所有回退到默认值的配置项
    ///
    /// `window_duration` 与 `window_number_of_messages` 是两个独立的配置项。
    pub fn resolve(&self) -> (ChatSettings, Vec<SettingsFallback>) {
        let mut fallbacks = Vec::new();

        let jail_duration = positive(
            "jail_duration",
            self.jail_duration,
            DEFAULT_JAIL_DURATION_SECS,
            &mut fallbacks,
        );
        let window_duration = positive(
            "window_duration",
            self.window_duration,
            DEFAULT_WINDOW_DURATION_SECS,
            &mut fallbacks,
        );
        let window_number_of_messages = positive(
            "window_number_of_messages",
            self.window_number_of_messages,
            DEFAULT_WINDOW_NUMBER_OF_MESSAGES,
            &mut fallbacks,
        );
        let batch_size = positive(
            "batch_size",
            self.batch_size,
            DEFAULT_BATCH_SIZE,
            &mut fallbacks,
        );
        let max_chat_log_size = positive(
            "max_chat_log_size",
            self.max_chat_log_size,
            DEFAULT_MAX_CHAT_LOG_SIZE,
            &mut fallbacks,
        );
        let flush_interval = positive(
            "flush_interval_seconds",
            self.flush_interval_seconds,
            DEFAULT_FLUSH_INTERVAL_SECS,
            &mut fallbacks,
        );
        let history_enabled = match self.history_enabled {
            Some(enabled) => enabled,
            None => {
                fallbacks.push(SettingsFallback {
                    key: "history_enabled",
                    reason: FallbackReason::Missing,
                    applied: false.to_string(),
                });
                false
            }
        };

        let settings = ChatSettings {
            jail_duration: Duration::from_secs(jail_duration),
            window_duration: Duration::from_secs(window_duration),
            window_number_of_messages,
            batch_size,
            max_chat_log_size,
            flush_interval: Duration::from_secs(flush_interval),
            history_enabled,
        };
        (settings, fallbacks)
    }
}

/// 持久化存储配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StorageConfig {
    /// 为空时使用内存存储
    #[serde(default)]
    #[validate(length(min = 1))]
    pub database_url: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
        }
    }
}

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// 启动时创建的频道，每个频道一个聊天服务
    #[serde(default = "default_channels")]
    #[validate(length(min = 1))]
    pub channels: Vec<String>,
    #[serde(default)]
    pub chat_configuration: RawChatSettings,
    #[serde(default)]
    #[validate(nested)]
    pub storage: StorageConfig,
}

fn default_channels() -> Vec<String> {
    vec!["lobby".to_string()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            chat_configuration: RawChatSettings::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载顺序：默认值 -> 可选配置文件（CHAT_CONFIG_FILE）-> 环境变量（CHAT_*）
    pub fn load() -> Result<Self, ConfigError> {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("CHAT_CONFIG_FILE") {
            fig = merge_file(fig, Path::new(&path));
        }
        fig = fig.merge(Env::prefixed("CHAT_").ignore(&["config_file"]).split("__"));
        Self::extract(fig)
    }

    /// 只从指定文件加载（热更新时使用）
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        Self::extract(merge_file(fig, path))
    }

    fn extract(fig: Figment) -> Result<Self, ConfigError> {
        let cfg: AppConfig = fig.extract().map_err(Box::new)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 脱敏后的字符串表示（用于日志）
    pub fn sanitize(&self) -> String {
        let mut copy = self.clone();
        if copy.storage.database_url.is_some() {
            copy.storage.database_url = Some("[REDACTED]".into());
        }
        format!("{:?}", copy)
    }
}

fn merge_file(fig: Figment, path: &Path) -> Figment {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yml") | Some("yaml") => fig.merge(Yaml::file(path)),
        Some("json") => fig.merge(Json::file(path)),
        _ => fig.merge(Toml::file(path)),
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("Invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("Failed to watch configuration file: {0}")]
    Watch(#[from] notify::Error),
}
