//! 在线连接表

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domain::{ChatUserInfoDto, ConnectionId, PresenceEntry, UserInfo};

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: DashMap<ConnectionId, PresenceEntry>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记连接尝试；连接已存在时返回 `false`
    pub fn begin_connect(&self, connection_id: ConnectionId) -> bool {
        match self.entries.entry(connection_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(PresenceEntry::connecting(connection_id));
                true
            }
        }
    }

    /// 身份解析成功后标记为已连接
    pub fn complete_connect(
        &self,
        connection_id: ConnectionId,
        user: UserInfo,
    ) -> Option<PresenceEntry> {
        let mut entry = self.entries.get_mut(&connection_id)?;
        entry.mark_connected(user);
        Some(entry.clone())
    }

    pub fn remove(&self, connection_id: ConnectionId) -> Option<PresenceEntry> {
        self.entries.remove(&connection_id).map(|(_, entry)| entry)
    }

    /// 仅返回已完成身份解析的连接
    pub fn connected(&self, connection_id: ConnectionId) -> Option<PresenceEntry> {
        self.entries
            .get(&connection_id)
            .filter(|entry| entry.is_connected())
            .map(|entry| entry.clone())
    }

    pub fn connected_users(&self) -> Vec<ChatUserInfoDto> {
        let mut users: Vec<ChatUserInfoDto> = self
            .entries
            .iter()
            .filter(|entry| entry.is_connected())
            .map(|entry| entry.to_dto())
            .collect();
        users.sort_by_key(|user| user.connection_id);
        users
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
