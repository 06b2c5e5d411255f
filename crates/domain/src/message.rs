use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::{MessageContent, MessageId, RoomId, Timestamp, UserId};

/// 持久化的聊天消息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub text: MessageContent,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(room_id: RoomId, sender_id: UserId, text: MessageContent, now: Timestamp) -> Self {
        Self {
            id: MessageId::new(Uuid::new_v4()),
            room_id,
            sender_id,
            text,
            created_at: now,
        }
    }
}

/// 扇出层的投递单元：一条消息加上它的接收者集合。
///
/// `recipient_ids` 为房间全体成员；对发送者自身的抑制发生在投递
/// 阶段（按 `sender_id` 判断），信封本身不做剔除。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message: Message,
    pub recipient_ids: Vec<UserId>,
}

impl MessageEnvelope {
    pub fn new(message: Message, recipient_ids: Vec<UserId>) -> Self {
        Self {
            message,
            recipient_ids,
        }
    }

    pub fn sender_id(&self) -> UserId {
        self.message.sender_id
    }
}
