//! 游标分页与对话房间竞争的集成测试。

use std::sync::Arc;

use application::memory::{InMemoryMessageRepository, InMemoryRoomRepository};
use application::{
    decode_page_token, Clock, DeliveryDispatcher, InMemorySessionRegistry, LocalFanout, ManualClock,
    MessageService, MessageServiceDependencies, RoomService, SendDestination, SessionRegistry,
};
use async_trait::async_trait;
use domain::{
    DialogRoomOutcome, MessageRepository, RepositoryError, Room, RoomId, RoomRepository,
    Timestamp, UserId,
};
use tokio::sync::Mutex;
use uuid::Uuid;

fn message_service(
    rooms: Arc<dyn RoomRepository>,
    messages: Arc<dyn MessageRepository>,
    clock: Arc<ManualClock>,
) -> MessageService {
    let registry = Arc::new(InMemorySessionRegistry::new(clock.clone()));
    let dispatcher = Arc::new(DeliveryDispatcher::new(
        registry.clone() as Arc<dyn SessionRegistry>
    ));
    MessageService::new(MessageServiceDependencies {
        room_repository: rooms,
        message_repository: messages,
        registry,
        fanout: Arc::new(LocalFanout::new(dispatcher)),
        clock,
    })
}

#[tokio::test]
async fn message_pages_walk_strictly_backwards() {
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let rooms = Arc::new(InMemoryRoomRepository::new());
    let messages = Arc::new(InMemoryMessageRepository::new());
    let service = message_service(rooms.clone(), messages.clone(), clock.clone());

    let alice = UserId::new(Uuid::new_v4());
    let bob = UserId::new(Uuid::new_v4());
    let room = Room::new("pair", false, vec![alice, bob], clock.now()).unwrap();
    rooms.create(&room).await.unwrap();

    // 7 条消息，间隔拉开到秒级（游标只保留秒精度）
    for i in 0..7 {
        clock.advance(chrono::Duration::seconds(2));
        service
            .send_message(alice, SendDestination::Room(room.id), format!("msg {i}"))
            .await
            .unwrap();
    }

    let first = service
        .list_messages(alice, room.id, None, 3)
        .await
        .unwrap();
    assert_eq!(first.messages.len(), 3);
    assert_eq!(first.messages[0].text.as_str(), "msg 6");
    let token = first.next_page_token.expect("full page carries a cursor");

    let cursor = decode_page_token(&token).unwrap();
    let second = service
        .list_messages(alice, room.id, Some(&token), 3)
        .await
        .unwrap();
    assert_eq!(second.messages.len(), 3);
    // 第二页的每一条都严格早于游标
    assert!(second.messages.iter().all(|m| m.created_at < cursor));
    let token = second.next_page_token.expect("still a full page");

    let last = service
        .list_messages(alice, room.id, Some(&token), 3)
        .await
        .unwrap();
    assert_eq!(last.messages.len(), 1);
    assert!(last.next_page_token.is_none(), "short page is the last page");
}

#[tokio::test]
async fn invalid_page_token_is_rejected() {
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let rooms = Arc::new(InMemoryRoomRepository::new());
    let messages = Arc::new(InMemoryMessageRepository::new());
    let service = message_service(rooms.clone(), messages, clock.clone());

    let alice = UserId::new(Uuid::new_v4());
    let bob = UserId::new(Uuid::new_v4());
    let room = Room::new("pair", false, vec![alice, bob], clock.now()).unwrap();
    rooms.create(&room).await.unwrap();

    let err = service
        .list_messages(alice, room.id, Some("some_invalid_token"), 10)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        application::ApplicationError::Domain(domain::DomainError::InvalidArgument { .. })
    ));

    let err = service
        .list_messages(alice, room.id, None, 101)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        application::ApplicationError::Domain(domain::DomainError::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn room_listing_pages_by_last_message_time() {
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let rooms = Arc::new(InMemoryRoomRepository::new());
    let room_service = RoomService::new(rooms.clone(), clock.clone());

    let alice = UserId::new(Uuid::new_v4());

    for i in 0..5 {
        clock.advance(chrono::Duration::seconds(2));
        let peer = UserId::new(Uuid::new_v4());
        room_service
            .create_room(alice, format!("room {i}"), vec![peer], false)
            .await
            .unwrap();
    }

    let first = room_service.list_rooms(alice, None, 2).await.unwrap();
    assert_eq!(first.rooms.len(), 2);
    assert_eq!(first.rooms[0].name, "room 4");
    let token = first.next_page_token.expect("full page carries a cursor");

    let second = room_service
        .list_rooms(alice, Some(&token), 2)
        .await
        .unwrap();
    assert_eq!(second.rooms.len(), 2);
    assert!(second.rooms[0].last_message_time < first.rooms[1].last_message_time);

    let token = second.next_page_token.expect("still a full page");
    let last = room_service
        .list_rooms(alice, Some(&token), 2)
        .await
        .unwrap();
    assert_eq!(last.rooms.len(), 1);
    assert!(last.next_page_token.is_none());
}

/// 模拟竞争失败的房间存储：第二次创建对话房间时报告 AlreadyExists，
/// 携带第一次创建的房间。
struct RacingRoomStore {
    inner: InMemoryRoomRepository,
    forced_winner: Mutex<Option<Room>>,
}

impl RacingRoomStore {
    fn new() -> Self {
        Self {
            inner: InMemoryRoomRepository::new(),
            forced_winner: Mutex::new(None),
        }
    }
}

#[async_trait]
impl RoomRepository for RacingRoomStore {
    async fn create(&self, room: &Room) -> Result<(), RepositoryError> {
        self.inner.create(room).await
    }

    async fn create_dialog_room(
        &self,
        room: &Room,
    ) -> Result<DialogRoomOutcome, RepositoryError> {
        let mut winner = self.forced_winner.lock().await;
        match winner.as_ref() {
            // 第二个到达者：房间已被并发的首条消息抢先创建
            Some(existing) => Ok(DialogRoomOutcome::AlreadyExists(existing.clone())),
            None => {
                self.inner.create(room).await?;
                *winner = Some(room.clone());
                Ok(DialogRoomOutcome::Created(room.clone()))
            }
        }
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn find_dialog_room(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Room>, RepositoryError> {
        self.inner.find_dialog_room(a, b).await
    }

    async fn members(&self, id: RoomId) -> Result<Vec<UserId>, RepositoryError> {
        self.inner.members(id).await
    }

    async fn touch_last_message(&self, id: RoomId, at: Timestamp) -> Result<(), RepositoryError> {
        self.inner.touch_last_message(id, at).await
    }

    async fn list_rooms_before(
        &self,
        user_id: UserId,
        before: Option<Timestamp>,
        page_size: u32,
    ) -> Result<Vec<Room>, RepositoryError> {
        self.inner.list_rooms_before(user_id, before, page_size).await
    }
}

#[tokio::test]
async fn lost_create_race_reuses_winning_room() {
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let rooms = Arc::new(RacingRoomStore::new());
    let messages = Arc::new(InMemoryMessageRepository::new());
    let service = message_service(rooms.clone(), messages.clone(), clock.clone());

    let alice = UserId::new(Uuid::new_v4());
    let bob = UserId::new(Uuid::new_v4());

    let first = service
        .send_message(alice, SendDestination::User(bob), "first")
        .await
        .unwrap();
    let second = service
        .send_message(bob, SendDestination::User(alice), "second")
        .await
        .unwrap();

    assert_eq!(first.room.id, second.room.id);
    let stored = messages.all().await;
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|m| m.room_id == first.room.id));
}
