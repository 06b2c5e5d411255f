use std::sync::Arc;

use application::{AuthService, MessageService, RoomService, TokenVerifier};

#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub message_service: Arc<MessageService>,
    pub room_service: Arc<RoomService>,
    pub token_verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn new(
        auth_service: Arc<AuthService>,
        message_service: Arc<MessageService>,
        room_service: Arc<RoomService>,
        token_verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            auth_service,
            message_service,
            room_service,
            token_verifier,
        }
    }
}
