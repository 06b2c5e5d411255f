//! 仓储的内存实现
//!
//! 用于测试和单进程演示部署。对话房间的“查找或创建”在一把锁内
//! 完成，天然满足原子性要求。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    DialogRoomOutcome, Message, MessageRepository, RefreshToken, RefreshTokenRepository,
    RepositoryError, Room, RoomId, RoomRepository, Timestamp, User, UserId, UserRepository,
    Username,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == user.username) {
            return Err(RepositoryError::Conflict);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| &u.username == username)
            .cloned())
    }
}

#[derive(Default)]
struct RoomState {
    rooms: HashMap<RoomId, Room>,
    // 无序用户对 -> 对话房间
    dialogs: HashMap<String, RoomId>,
}

#[derive(Default)]
pub struct InMemoryRoomRepository {
    state: RwLock<RoomState>,
}

impl InMemoryRoomRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn create(&self, room: &Room) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.rooms.insert(room.id, room.clone());
        Ok(())
    }

    async fn create_dialog_room(
        &self,
        room: &Room,
    ) -> Result<DialogRoomOutcome, RepositoryError> {
        let key = Room::dialog_key(room.member_ids[0], room.member_ids[1]);
        let mut state = self.state.write().await;
        if let Some(existing_id) = state.dialogs.get(&key) {
            let existing = state
                .rooms
                .get(existing_id)
                .cloned()
                .ok_or(RepositoryError::NotFound)?;
            return Ok(DialogRoomOutcome::AlreadyExists(existing));
        }
        state.dialogs.insert(key, room.id);
        state.rooms.insert(room.id, room.clone());
        Ok(DialogRoomOutcome::Created(room.clone()))
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        Ok(self.state.read().await.rooms.get(&id).cloned())
    }

    async fn find_dialog_room(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Room>, RepositoryError> {
        let state = self.state.read().await;
        let key = Room::dialog_key(a, b);
        Ok(state
            .dialogs
            .get(&key)
            .and_then(|id| state.rooms.get(id))
            .cloned())
    }

    async fn members(&self, id: RoomId) -> Result<Vec<UserId>, RepositoryError> {
        self.state
            .read()
            .await
            .rooms
            .get(&id)
            .map(|room| room.member_ids.clone())
            .ok_or(RepositoryError::NotFound)
    }

    async fn touch_last_message(&self, id: RoomId, at: Timestamp) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let room = state.rooms.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        room.touch(at);
        Ok(())
    }

    async fn list_rooms_before(
        &self,
        user_id: UserId,
        before: Option<Timestamp>,
        page_size: u32,
    ) -> Result<Vec<Room>, RepositoryError> {
        let state = self.state.read().await;
        let mut rooms: Vec<Room> = state
            .rooms
            .values()
            .filter(|room| room.is_member(user_id))
            .filter(|room| before.map_or(true, |cursor| room.last_message_time < cursor))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        rooms.truncate(page_size as usize);
        Ok(rooms)
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn save(&self, message: &Message) -> Result<(), RepositoryError> {
        self.messages.write().await.push(message.clone());
        Ok(())
    }

    async fn list_messages_before(
        &self,
        room_id: RoomId,
        before: Option<Timestamp>,
        page_size: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut page: Vec<Message> = messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .filter(|m| before.map_or(true, |cursor| m.created_at < cursor))
            .cloned()
            .collect();
        page.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        page.truncate(page_size as usize);
        Ok(page)
    }
}

#[derive(Default)]
pub struct InMemoryRefreshTokenRepository {
    tokens: RwLock<HashMap<Uuid, RefreshToken>>,
}

impl InMemoryRefreshTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenRepository for InMemoryRefreshTokenRepository {
    async fn add(&self, token: &RefreshToken) -> Result<(), RepositoryError> {
        self.tokens.write().await.insert(token.token, token.clone());
        Ok(())
    }

    async fn get(&self, token: Uuid) -> Result<Option<RefreshToken>, RepositoryError> {
        Ok(self.tokens.read().await.get(&token).cloned())
    }

    async fn delete(&self, token: Uuid) -> Result<(), RepositoryError> {
        self.tokens.write().await.remove(&token);
        Ok(())
    }
}

/// 保持 Arc 包装便于在测试和装配代码之间共享。
pub type SharedInMemoryRepositories = (
    Arc<InMemoryUserRepository>,
    Arc<InMemoryRoomRepository>,
    Arc<InMemoryMessageRepository>,
    Arc<InMemoryRefreshTokenRepository>,
);

pub fn shared_repositories() -> SharedInMemoryRepositories {
    (
        Arc::new(InMemoryUserRepository::new()),
        Arc::new(InMemoryRoomRepository::new()),
        Arc::new(InMemoryMessageRepository::new()),
        Arc::new(InMemoryRefreshTokenRepository::new()),
    )
}
