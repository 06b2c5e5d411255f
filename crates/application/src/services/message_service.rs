//! 消息用例服务
//!
//! 发送路径：确定目标房间（必要时惰性创建对话房间）→ 持久化消息 →
//! 推进房间游标 → 构造信封交给扇出通道。发送请求在消息落库后即告
//! 成功，逐接收者的投递失败永远不会上抛给发送方。

use std::sync::Arc;

use domain::{
    DomainError, Message, MessageContent, MessageEnvelope, MessageRepository, Room, RoomId,
    RoomRepository, UserId,
};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::fanout::MessageFanout;
use crate::page_token::{decode_page_token, encode_page_token};
use crate::session::{DoneSignal, MessageSink, SessionRegistry};
use crate::token::AccessClaims;

/// 单页最大条数，超过即拒绝。
pub const MAX_PAGE_SIZE: u32 = 100;

/// 消息的投递目标：已有房间，或按用户惰性建立对话房间。
#[derive(Debug, Clone, Copy)]
pub enum SendDestination {
    Room(RoomId),
    User(UserId),
}

/// 发送成功的结果：消息落入的房间与存储后的消息。
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub room: Room,
    pub message: Message,
}

#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub next_page_token: Option<String>,
}

pub struct MessageServiceDependencies {
    pub room_repository: Arc<dyn RoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub registry: Arc<dyn SessionRegistry>,
    pub fanout: Arc<dyn MessageFanout>,
    pub clock: Arc<dyn Clock>,
}

pub struct MessageService {
    room_repository: Arc<dyn RoomRepository>,
    message_repository: Arc<dyn MessageRepository>,
    registry: Arc<dyn SessionRegistry>,
    fanout: Arc<dyn MessageFanout>,
    clock: Arc<dyn Clock>,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self {
            room_repository: deps.room_repository,
            message_repository: deps.message_repository,
            registry: deps.registry,
            fanout: deps.fanout,
            clock: deps.clock,
        }
    }

    pub async fn send_message(
        &self,
        sender: UserId,
        destination: SendDestination,
        text: impl Into<String>,
    ) -> Result<SentMessage, ApplicationError> {
        let text = MessageContent::new(text)?;
        let now = self.clock.now();

        let room = match destination {
            SendDestination::Room(room_id) => {
                let room = self
                    .room_repository
                    .find_by_id(room_id)
                    .await?
                    .ok_or(DomainError::RoomNotFound)?;
                if !room.is_member(sender) {
                    return Err(ApplicationError::permission_denied("user not in room"));
                }
                room
            }
            SendDestination::User(recipient) => {
                // 首条消息惰性创建对话房间。创建与“已存在”的区分必须由
                // 存储层在单个操作内给出，并发的首条消息才能收敛到同
                // 一个房间。
                let draft = Room::new_dialog(sender, recipient, now)?;
                let outcome = self.room_repository.create_dialog_room(&draft).await?;
                outcome.into_room()
            }
        };

        let message = Message::new(room.id, sender, text, now);
        self.message_repository.save(&message).await?;
        self.room_repository.touch_last_message(room.id, now).await?;

        tracing::info!(
            message_id = %message.id,
            room_id = %room.id,
            sender_id = %sender,
            "消息已持久化"
        );

        // 扇出是尽力而为：发布失败只记日志，发送请求已经成功
        let envelope = MessageEnvelope::new(message.clone(), room.member_ids.clone());
        if let Err(err) = self.fanout.publish(envelope).await {
            tracing::warn!(error = %err, message_id = %message.id, "消息扇出发布失败");
        }

        Ok(SentMessage { room, message })
    }

    /// 把校验过的身份注册到会话注册表。返回的 done 信号由传输层
    /// 的流任务阻塞等待；会话有效期固化为令牌的过期时间。
    pub async fn open_stream(
        &self,
        claims: &AccessClaims,
        sink: Arc<dyn MessageSink>,
    ) -> DoneSignal {
        tracing::info!(subject_id = %claims.subject, "streaming started");
        self.registry
            .register(claims.subject, sink, claims.expires_at)
            .await
    }

    /// 流结束（连接取消或强制过期）后的清理。幂等。
    pub async fn close_stream(&self, subject_id: UserId) {
        self.registry.remove(subject_id).await;
        tracing::info!(subject_id = %subject_id, "streaming ended");
    }

    pub async fn list_messages(
        &self,
        requester: UserId,
        room_id: RoomId,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<MessagePage, ApplicationError> {
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(DomainError::invalid_argument(
                "page_size",
                format!("cannot be bigger than {MAX_PAGE_SIZE}"),
            )
            .into());
        }

        let room = self
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or(DomainError::RoomNotFound)?;
        if !room.is_member(requester) {
            return Err(ApplicationError::permission_denied("user not in room"));
        }

        let before = page_token.map(decode_page_token).transpose()?;
        let messages = self
            .message_repository
            .list_messages_before(room_id, before, page_size)
            .await?;

        // 整页返回才下发游标；不足一页即最后一页
        let next_page_token = if messages.len() == page_size as usize {
            messages.last().map(|m| encode_page_token(m.created_at))
        } else {
            None
        };

        Ok(MessagePage {
            messages,
            next_page_token,
        })
    }
}
