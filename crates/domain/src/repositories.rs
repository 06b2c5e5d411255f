//! 存储层抽象接口
//!
//! 仓储由基础设施层实现（PostgreSQL），测试中使用内存实现。

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::message::Message;
use crate::room::Room;
use crate::token::RefreshToken;
use crate::user::User;
use crate::value_objects::{RoomId, Timestamp, UserId, Username};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 保存新用户；用户名重复时返回 `Conflict`。
    async fn create(&self, user: &User) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_username(&self, username: &Username)
        -> Result<Option<User>, RepositoryError>;
}

/// 对话房间原子化“查找或创建”的结果。
///
/// 并发的首条消息可能竞争创建同一对用户的对话房间；存储层负责
/// 在单个操作内区分两种结局，调用方据此决定把消息写进哪个房间。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogRoomOutcome {
    Created(Room),
    AlreadyExists(Room),
}

impl DialogRoomOutcome {
    pub fn into_room(self) -> Room {
        match self {
            DialogRoomOutcome::Created(room) | DialogRoomOutcome::AlreadyExists(room) => room,
        }
    }
}

#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn create(&self, room: &Room) -> Result<(), RepositoryError>;

    /// 创建对话房间；若同一无序用户对的房间已存在（包括并发创建
    /// 竞争失败的情形），返回 `AlreadyExists` 并携带已有房间。
    async fn create_dialog_room(&self, room: &Room)
        -> Result<DialogRoomOutcome, RepositoryError>;

    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError>;
    async fn find_dialog_room(&self, a: UserId, b: UserId)
        -> Result<Option<Room>, RepositoryError>;
    async fn members(&self, id: RoomId) -> Result<Vec<UserId>, RepositoryError>;

    /// 推进房间的 `last_message_time`（分页游标字段）。
    async fn touch_last_message(&self, id: RoomId, at: Timestamp) -> Result<(), RepositoryError>;

    /// 按 `last_message_time` 倒序列出用户参与的房间；`before` 为空时
    /// 从最新开始。
    async fn list_rooms_before(
        &self,
        user_id: UserId,
        before: Option<Timestamp>,
        page_size: u32,
    ) -> Result<Vec<Room>, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn save(&self, message: &Message) -> Result<(), RepositoryError>;

    /// 按 `created_at` 倒序列出房间内的消息；`before` 为空时从最新开始。
    async fn list_messages_before(
        &self,
        room_id: RoomId,
        before: Option<Timestamp>,
        page_size: u32,
    ) -> Result<Vec<Message>, RepositoryError>;
}

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn add(&self, token: &RefreshToken) -> Result<(), RepositoryError>;
    async fn get(&self, token: Uuid) -> Result<Option<RefreshToken>, RepositoryError>;
    /// 删除不存在的令牌不是错误。
    async fn delete(&self, token: Uuid) -> Result<(), RepositoryError>;
}
