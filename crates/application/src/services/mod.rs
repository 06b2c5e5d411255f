pub mod auth_service;
pub mod message_service;
pub mod room_service;

pub use auth_service::{AuthService, AuthServiceDependencies};
pub use message_service::{
    MessagePage, MessageService, MessageServiceDependencies, SendDestination, SentMessage,
};
pub use room_service::{RoomPage, RoomService};
