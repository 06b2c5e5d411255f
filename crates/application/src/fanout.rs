//! 消息扇出通道抽象
//!
//! 把本地产生的信封广播给所有服务进程。发布端必须是“发出即忘”：
//! 慢消费者或暂时不存在的消费者不能阻塞发送方；消息本身的持久性
//! 由消息存储保证，不在这一层。

use std::sync::Arc;

use async_trait::async_trait;
use domain::MessageEnvelope;
use thiserror::Error;

use crate::dispatcher::DeliveryDispatcher;

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("fanout publish failed: {0}")]
    Publish(String),
}

impl FanoutError {
    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish(message.into())
    }
}

#[async_trait]
pub trait MessageFanout: Send + Sync {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), FanoutError>;
}

/// 单进程部署的扇出实现：跳过广播通道，直接交给本地调度器。
///
/// 投递在独立任务中进行，发布方不等待任何一条流的写入。
pub struct LocalFanout {
    dispatcher: Arc<DeliveryDispatcher>,
}

impl LocalFanout {
    pub fn new(dispatcher: Arc<DeliveryDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl MessageFanout for LocalFanout {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), FanoutError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            dispatcher.dispatch(&envelope).await;
        });
        Ok(())
    }
}
