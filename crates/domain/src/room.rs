use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;
use crate::value_objects::{RoomId, Timestamp, UserId};

/// 聊天房间。
///
/// `last_message_time` 在每条消息写入时被推进，同时充当房间列表的
/// 分页游标字段。双人对话房间（dialog）在首条消息时惰性创建，
/// 同一对用户至多存在一个对话房间。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub created_at: Timestamp,
    pub is_dialog: bool,
    pub member_ids: Vec<UserId>,
    pub last_message_time: Timestamp,
}

impl Room {
    pub fn new(
        name: impl Into<String>,
        is_dialog: bool,
        member_ids: Vec<UserId>,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        if member_ids.len() < 2 {
            return Err(DomainError::invalid_argument(
                "member_ids",
                "cannot be less than 2 users",
            ));
        }
        if is_dialog && member_ids.len() != 2 {
            return Err(DomainError::InvalidDialogMembers);
        }
        Ok(Self {
            id: RoomId::new(Uuid::new_v4()),
            name: name.into(),
            created_at: now,
            is_dialog,
            member_ids,
            last_message_time: now,
        })
    }

    /// 两个用户之间的对话房间，首条消息时惰性创建。
    pub fn new_dialog(a: UserId, b: UserId, now: Timestamp) -> Result<Self, DomainError> {
        if a == b {
            return Err(DomainError::invalid_argument(
                "member_ids",
                "dialog requires two distinct users",
            ));
        }
        Self::new(String::new(), true, vec![a, b], now)
    }

    /// 无序用户对的规范化键，用于存储层的对话房间唯一约束。
    pub fn dialog_key(a: UserId, b: UserId) -> String {
        let (lo, hi) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        format!("{lo}:{hi}")
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.member_ids.contains(&user_id)
    }

    pub fn touch(&mut self, at: Timestamp) {
        if at > self.last_message_time {
            self.last_message_time = at;
        }
    }
}
