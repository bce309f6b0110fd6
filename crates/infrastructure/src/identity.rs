//! 会话身份表：传输层在握手完成后登记连接对应的用户

use async_trait::async_trait;
use dashmap::DashMap;
use domain::{ConnectionId, DomainResult, IdentityResolver, UserInfo};

#[derive(Debug, Default)]
pub struct SessionIdentityResolver {
    sessions: DashMap<ConnectionId, UserInfo>,
}

impl SessionIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, connection_id: ConnectionId, user: UserInfo) {
        self.sessions.insert(connection_id, user);
    }

    pub fn unbind(&self, connection_id: ConnectionId) -> Option<UserInfo> {
        self.sessions.remove(&connection_id).map(|(_, user)| user)
    }
}

#[async_trait]
impl IdentityResolver for SessionIdentityResolver {
    async fn resolve(&self, connection_id: ConnectionId) -> DomainResult<Option<UserInfo>> {
        Ok(self
            .sessions
            .get(&connection_id)
            .map(|user| user.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn resolves_only_bound_sessions() {
        let resolver = SessionIdentityResolver::new();
        let id = ConnectionId::new(5);
        assert_eq!(resolver.resolve(id).await.unwrap(), None);

        resolver.bind(id, UserInfo::new("carol", json!({"nick": "c"})));
        let user = resolver.resolve(id).await.unwrap().unwrap();
        assert_eq!(user.user_id, "carol");

        resolver.unbind(id);
        assert_eq!(resolver.resolve(id).await.unwrap(), None);
    }
}
