use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::presence::ConnectionStatus;
use crate::value_objects::{ConnectionId, Timestamp};

/// 消息附加信息，保持插入顺序（例如 `"flood" -> true`）。
pub type Metadata = serde_json::Map<String, Value>;

/// 发送者信息，由上游身份解析提供，按值复制进每条消息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: String,
    /// 不透明的用户资料数据
    pub profile_data: Value,
}

impl UserInfo {
    pub fn new(user_id: impl Into<String>, profile_data: Value) -> Self {
        Self {
            user_id: user_id.into(),
            profile_data,
        }
    }
}

/// 聊天记录。
///
/// 排序键为 `timestamp`，时间相同时按到达顺序。入队之前处理器链
/// 可以扩展 `metadata`，入队之后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub channel: String,
    pub timestamp: Timestamp,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub sender: UserInfo,
}

impl ChatMessage {
    pub fn new(
        channel: impl Into<String>,
        timestamp: Timestamp,
        text: impl Into<String>,
        sender: UserInfo,
    ) -> Self {
        Self {
            channel: channel.into(),
            timestamp,
            text: text.into(),
            metadata: Metadata::new(),
            sender,
        }
    }

    /// 是否被标记为刷屏消息
    pub fn is_flagged_as_flood(&self) -> bool {
        matches!(self.metadata.get("flood"), Some(Value::Bool(true)))
    }
}

/// 推送给客户端的用户信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatUserInfoDto {
    pub user_id: String,
    pub connection_id: ConnectionId,
    pub status: ConnectionStatus,
    /// 序列化后的用户资料
    pub data: String,
}

/// 推送给客户端的轻量消息表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageDto {
    pub message: String,
    /// 序列化后的 metadata（JSON 对象）
    pub metadata: String,
    /// Unix 毫秒时间戳
    pub timestamp: i64,
    pub user_info: ChatUserInfoDto,
}

impl ChatMessageDto {
    /// 由历史记录构造推送表示；历史消息没有关联的连接。
    pub fn from_history(message: &ChatMessage) -> Self {
        Self {
            message: message.text.clone(),
            metadata: Value::Object(message.metadata.clone()).to_string(),
            timestamp: message.timestamp.timestamp_millis(),
            user_info: ChatUserInfoDto {
                user_id: message.sender.user_id.clone(),
                connection_id: ConnectionId::default(),
                status: ConnectionStatus::Disconnected,
                data: message.sender.profile_data.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn sample() -> ChatMessage {
        ChatMessage::new(
            "lobby",
            Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
            "hello",
            UserInfo::new("alice", json!({"level": 3})),
        )
    }

    #[test]
    fn flood_flag_reads_metadata() {
        let mut message = sample();
        assert!(!message.is_flagged_as_flood());
        message.metadata.insert("flood".into(), Value::Bool(true));
        assert!(message.is_flagged_as_flood());
    }

    #[test]
    fn metadata_keeps_insertion_order() {
        let mut message = sample();
        message.metadata.insert("zeta".into(), json!(1));
        message.metadata.insert("alpha".into(), json!(2));
        let keys: Vec<_> = message.metadata.keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn history_dto_copies_content() {
        let dto = ChatMessageDto::from_history(&sample());
        assert_eq!(dto.message, "hello");
        assert_eq!(dto.timestamp, 1_700_000_000_123);
        assert_eq!(dto.metadata, "{}");
        assert_eq!(dto.user_info.user_id, "alice");
        assert_eq!(dto.user_info.data, r#"{"level":3}"#);
    }
}
