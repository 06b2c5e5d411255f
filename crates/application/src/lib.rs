//! 应用层实现。
//!
//! 核心是会话/扇出子系统：会话注册表维护“哪个用户此刻在本节点上
//! 持有存活的下行流”，投递调度器把新产生的消息翻译成逐接收者的
//! 投递尝试，扇出通道把信封广播到所有服务进程。其余服务（认证、
//! 房间、消息历史）是围绕仓储接口的常规用例编排。

pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod fanout;
pub mod memory;
pub mod page_token;
pub mod password;
pub mod services;
pub mod session;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::DeliveryDispatcher;
pub use error::ApplicationError;
pub use fanout::{FanoutError, LocalFanout, MessageFanout};
pub use page_token::{decode_page_token, encode_page_token};
pub use password::{PasswordHasher, PasswordHasherError};
pub use services::{
    AuthService, AuthServiceDependencies, MessagePage, MessageService,
    MessageServiceDependencies, RoomPage, RoomService, SendDestination, SentMessage,
};
pub use session::{
    DeliveryOutcome, DoneSignal, InMemorySessionRegistry, MessageSink, SendError, SessionRegistry,
};
pub use token::{AccessClaims, AuthError, TokenIssuer, TokenPair, TokenVerifier};
