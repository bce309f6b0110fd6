use serde::{Deserialize, Serialize};

use crate::message::{ChatUserInfoDto, UserInfo};
use crate::value_objects::ConnectionId;

/// 连接状态，数值与客户端协议保持一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Connecting = 0,
    Connected = 1,
    Disconnected = 2,
    Error = 3,
}

/// 单个在线连接的状态记录
///
/// 连接尝试时创建（`Connecting`），身份解析成功后变为 `Connected`，
/// 断开时移除。同一个 `connection_id` 同时最多只有一条记录。
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceEntry {
    pub connection_id: ConnectionId,
    /// 身份解析完成前为空
    pub user: Option<UserInfo>,
    pub status: ConnectionStatus,
}

impl PresenceEntry {
    pub fn connecting(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            user: None,
            status: ConnectionStatus::Connecting,
        }
    }

    pub fn mark_connected(&mut self, user: UserInfo) {
        self.user = Some(user);
        self.status = ConnectionStatus::Connected;
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.user_id.as_str())
    }

    pub fn to_dto(&self) -> ChatUserInfoDto {
        ChatUserInfoDto {
            user_id: self.user_id().unwrap_or_default().to_string(),
            connection_id: self.connection_id,
            status: self.status,
            data: self
                .user
                .as_ref()
                .map(|user| user.profile_data.to_string())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lifecycle_moves_to_connected() {
        let mut entry = PresenceEntry::connecting(ConnectionId::new(7));
        assert!(!entry.is_connected());
        assert_eq!(entry.user_id(), None);

        entry.mark_connected(UserInfo::new("bob", json!({"nick": "b"})));
        assert!(entry.is_connected());
        assert_eq!(entry.user_id(), Some("bob"));

        let dto = entry.to_dto();
        assert_eq!(dto.connection_id, ConnectionId::new(7));
        assert_eq!(dto.status, ConnectionStatus::Connected);
        assert_eq!(dto.data, r#"{"nick":"b"}"#);
    }
}
