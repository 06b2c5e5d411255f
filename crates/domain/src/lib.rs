//! 消息系统核心领域模型
//!
//! 包含用户、房间、消息等核心实体，以及存储层的抽象接口。

pub mod errors;
pub mod message;
pub mod repositories;
pub mod room;
pub mod token;
pub mod user;
pub mod value_objects;

pub use errors::{DomainError, DomainResult, RepositoryError};
pub use message::{Message, MessageEnvelope};
pub use repositories::{
    DialogRoomOutcome, MessageRepository, RefreshTokenRepository, RoomRepository, UserRepository,
};
pub use room::Room;
pub use token::RefreshToken;
pub use user::{User, UserRole};
pub use value_objects::{MessageContent, MessageId, RoomId, Timestamp, UserId, Username};
