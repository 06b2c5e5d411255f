//! Web API 层
//!
//! axum 路由：认证端点、房间/消息的增删查（游标分页）、以及长连
//! 消息流（WebSocket）。传输细节到此为止，业务语义都在应用层。

pub mod error;
pub mod routes;
pub mod state;
pub mod stream;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
