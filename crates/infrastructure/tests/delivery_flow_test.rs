//! 应用层与进程内基础设施组装后的端到端流程

use std::sync::Arc;
use std::time::Duration;

use application::{
    AntiFloodHandler, ChatEventHandler, ChatLog, ChatRuntime, ChatService,
    ChatServiceDependencies, Clock, ManualClock, RateLimiter, StatusChange,
};
use config::{ChatSettings, SettingsProvider};
use domain::{ConnectionId, UserInfo};
use infrastructure::{
    InMemoryChatLogStore, LocalDeliveryHub, Outbound, SessionIdentityResolver,
};
use serde_json::json;

struct World {
    clock: Arc<ManualClock>,
    store: Arc<InMemoryChatLogStore>,
    identity: Arc<SessionIdentityResolver>,
    hub: Arc<LocalDeliveryHub>,
    chat_log: Arc<ChatLog>,
    service: Arc<ChatService>,
    _provider: SettingsProvider,
}

fn world(settings: ChatSettings) -> World {
    let provider = SettingsProvider::from_settings(settings);
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(InMemoryChatLogStore::with_page_size(3));
    let identity = Arc::new(SessionIdentityResolver::new());
    let hub = Arc::new(LocalDeliveryHub::new(64));
    let chat_log = Arc::new(ChatLog::new(store.clone(), provider.subscribe(), clock.clone()));
    let limiter = Arc::new(RateLimiter::new(provider.subscribe(), clock.clone()));

    let service = Arc::new(ChatService::new(
        "lobby",
        ChatServiceDependencies {
            identity: identity.clone(),
            chat_log: chat_log.clone(),
            delivery: hub.clone(),
            handlers: vec![Arc::new(AntiFloodHandler::new(limiter)) as Arc<dyn ChatEventHandler>],
            clock: clock.clone(),
        },
    ));

    World {
        clock,
        store,
        identity,
        hub,
        chat_log,
        service,
        _provider: provider,
    }
}

impl World {
    async fn join(&self, id: i64, user_id: &str) -> ConnectionId {
        let connection_id = ConnectionId::new(id);
        self.identity
            .bind(connection_id, UserInfo::new(user_id, json!({ "nick": user_id })));
        self.service.on_connect(connection_id).await.unwrap();
        connection_id
    }
}

fn message_text(outbound: Option<Outbound>) -> String {
    match outbound {
        Some(Outbound::Message(dto)) => dto.message,
        other => panic!("expected a chat message, got {other:?}"),
    }
}

#[tokio::test]
async fn flooding_user_only_hears_themselves() {
    let w = world(ChatSettings {
        window_number_of_messages: 1,
        ..ChatSettings::default()
    });
    let alice = w.join(1, "alice").await;
    let bob = w.join(2, "bob").await;
    let mut alice_rx = w.hub.subscribe("lobby", alice);
    let mut bob_rx = w.hub.subscribe("lobby", bob);

    w.service.submit_message(alice, "hello").await.unwrap();
    w.service.submit_message(alice, "spam").await.unwrap();
    w.service.submit_message(bob, "hi alice").await.unwrap();

    assert_eq!(message_text(alice_rx.recv().await), "hello");
    assert_eq!(message_text(alice_rx.recv().await), "spam");
    assert_eq!(message_text(alice_rx.recv().await), "hi alice");

    assert_eq!(message_text(bob_rx.recv().await), "hello");
    assert_eq!(message_text(bob_rx.recv().await), "hi alice");
}

#[tokio::test]
async fn leaving_user_is_announced() {
    let w = world(ChatSettings::default());
    let alice = w.join(1, "alice").await;
    let bob = w.join(2, "bob").await;
    let mut bob_rx = w.hub.subscribe("lobby", bob);

    w.service.on_disconnect(alice).await.unwrap();

    match bob_rx.recv().await {
        Some(Outbound::Status(StatusChange::Disconnected { user })) => {
            assert_eq!(user.user_id, "alice");
        }
        other => panic!("expected a disconnect notice, got {other:?}"),
    }
    assert_eq!(w.service.get_connected_users().len(), 1);
}

#[tokio::test]
async fn history_survives_flush_and_shutdown() {
    let w = world(ChatSettings {
        history_enabled: true,
        ..ChatSettings::default()
    });
    let runtime = ChatRuntime::start(w.chat_log.clone(), vec![w.service.clone()]).await;
    let alice = w.join(1, "alice").await;
    let start = w.clock.now();

    for i in 0..5 {
        w.service.submit_message(alice, &format!("m{i}")).await.unwrap();
        w.clock.advance(Duration::from_secs(1));
    }
    w.chat_log.flush().await;
    w.service.submit_message(alice, "m5").await.unwrap();

    let history = w
        .service
        .query_history("lobby", w.clock.now(), start)
        .await
        .unwrap();
    let texts: Vec<_> = history.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["m0", "m1", "m2", "m3", "m4", "m5"]);

    let report = runtime.stop().await;
    assert!(report.is_clean());
    assert_eq!(report.final_flush.written(), 1);
    assert_eq!(w.store.len(), 6);
}
