//! 发送→扇出→投递链路的集成测试（内存仓储 + 本地扇出）。

use std::sync::Arc;
use std::time::Duration;

use application::memory::{InMemoryMessageRepository, InMemoryRoomRepository};
use application::{
    AccessClaims, Clock, DeliveryDispatcher, DeliveryOutcome, InMemorySessionRegistry,
    LocalFanout, MessageService, MessageServiceDependencies, MessageSink, SendDestination,
    SendError, SessionRegistry, SystemClock,
};
use async_trait::async_trait;
use domain::{MessageEnvelope, RoomRepository, UserId, UserRole};
use tokio::sync::mpsc;
use uuid::Uuid;

/// 把信封转发到通道的测试 sink，模拟一条打开的下行流。
struct ChannelSink {
    tx: mpsc::UnboundedSender<MessageEnvelope>,
}

impl ChannelSink {
    fn pair() -> (Arc<Self>, mpsc::UnboundedReceiver<MessageEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn send(&self, envelope: MessageEnvelope) -> Result<(), SendError> {
        self.tx
            .send(envelope)
            .map_err(|_| SendError::new("stream closed"))
    }
}

struct Fixture {
    service: MessageService,
    rooms: Arc<InMemoryRoomRepository>,
    messages: Arc<InMemoryMessageRepository>,
    clock: Arc<SystemClock>,
}

fn fixture() -> Fixture {
    let clock = Arc::new(SystemClock);
    let registry = Arc::new(InMemorySessionRegistry::new(clock.clone()));
    let dispatcher = Arc::new(DeliveryDispatcher::new(
        registry.clone() as Arc<dyn SessionRegistry>
    ));
    let fanout = Arc::new(LocalFanout::new(dispatcher));
    let rooms = Arc::new(InMemoryRoomRepository::new());
    let messages = Arc::new(InMemoryMessageRepository::new());

    let service = MessageService::new(MessageServiceDependencies {
        room_repository: rooms.clone(),
        message_repository: messages.clone(),
        registry: registry.clone(),
        fanout,
        clock: clock.clone(),
    });

    Fixture {
        service,
        rooms,
        messages,
        clock,
    }
}

fn claims_for(user: UserId, clock: &dyn Clock) -> AccessClaims {
    AccessClaims {
        subject: user,
        role: UserRole::User,
        expires_at: clock.now() + chrono::Duration::hours(1),
    }
}

#[tokio::test]
async fn first_dialog_message_reaches_open_stream() {
    let fx = fixture();
    let alice = UserId::new(Uuid::new_v4());
    let bob = UserId::new(Uuid::new_v4());

    // A 打开消息流
    let (sink, mut rx) = ChannelSink::pair();
    let _done = fx
        .service
        .open_stream(&claims_for(alice, fx.clock.as_ref()), sink)
        .await;

    // B 给 A 发第一条消息（对话房间惰性创建）
    let sent = fx
        .service
        .send_message(bob, SendDestination::User(alice), "hi")
        .await
        .unwrap();
    assert!(sent.room.is_dialog);
    assert_eq!(sent.message.text.as_str(), "hi");

    // A 的流收到信封
    let envelope = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("delivery should arrive")
        .expect("stream open");
    assert_eq!(envelope.message.text.as_str(), "hi");
    assert_eq!(envelope.message.sender_id, bob);
    assert_eq!(envelope.message.room_id, sent.room.id);
}

#[tokio::test]
async fn offline_recipient_does_not_fail_send() {
    let fx = fixture();
    let alice = UserId::new(Uuid::new_v4());
    let bob = UserId::new(Uuid::new_v4());

    // 没有任何人在线；发送仍然成功（离线用户走历史拉取补偿）
    let sent = fx
        .service
        .send_message(bob, SendDestination::User(alice), "are you there?")
        .await
        .unwrap();

    let stored = fx.messages.all().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, sent.message.id);
}

#[tokio::test]
async fn concurrent_first_messages_converge_on_one_dialog_room() {
    let fx = fixture();
    let alice = UserId::new(Uuid::new_v4());
    let bob = UserId::new(Uuid::new_v4());

    let service = Arc::new(fx.service);
    let a_to_b = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .send_message(alice, SendDestination::User(bob), "from alice")
                .await
        })
    };
    let b_to_a = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .send_message(bob, SendDestination::User(alice), "from bob")
                .await
        })
    };

    let first = a_to_b.await.unwrap().unwrap();
    let second = b_to_a.await.unwrap().unwrap();

    // 两条首消息必须落进同一个对话房间
    assert_eq!(first.room.id, second.room.id);
    let dialog = fx
        .rooms
        .find_dialog_room(alice, bob)
        .await
        .unwrap()
        .expect("dialog room exists");
    assert_eq!(dialog.id, first.room.id);

    let stored = fx.messages.all().await;
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|m| m.room_id == dialog.id));
}

#[tokio::test]
async fn send_to_group_room_requires_membership() {
    let fx = fixture();
    let alice = UserId::new(Uuid::new_v4());
    let bob = UserId::new(Uuid::new_v4());
    let outsider = UserId::new(Uuid::new_v4());

    let room = domain::Room::new("team", false, vec![alice, bob], fx.clock.now()).unwrap();
    fx.rooms.create(&room).await.unwrap();

    let err = fx
        .service
        .send_message(outsider, SendDestination::Room(room.id), "let me in")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        application::ApplicationError::PermissionDenied(_)
    ));
}

#[tokio::test]
async fn expired_stream_gets_done_signal_on_next_delivery() {
    use application::ManualClock;

    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let registry = Arc::new(InMemorySessionRegistry::new(clock.clone()));
    let dispatcher = DeliveryDispatcher::new(registry.clone() as Arc<dyn SessionRegistry>);

    let alice = UserId::new(Uuid::new_v4());
    let bob = UserId::new(Uuid::new_v4());
    let (sink, _rx) = ChannelSink::pair();
    let done = registry
        .register(alice, sink, clock.now() + chrono::Duration::minutes(1))
        .await;

    clock.advance(chrono::Duration::minutes(5));

    let message = domain::Message::new(
        domain::RoomId::new(Uuid::new_v4()),
        bob,
        domain::MessageContent::new("too late").unwrap(),
        clock.now(),
    );
    let envelope = MessageEnvelope::new(message, vec![alice]);
    let outcomes = dispatcher.dispatch(&envelope).await;
    assert_eq!(outcomes, vec![(alice, DeliveryOutcome::Unauthenticated)]);

    // 流任务的等待被强制过期唤醒
    tokio::time::timeout(Duration::from_secs(1), done.expired())
        .await
        .expect("done signal fires");
}
