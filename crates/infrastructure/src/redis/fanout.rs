//! 跨进程消息扇出
//!
//! 发布端把信封序列化成 JSON，PUBLISH 到所有服务进程共享的频道；
//! 每个进程的订阅循环把收到的信封交给本地投递调度器，由调度器按
//! `sender_id` 抑制自投递并对本节点注册的接收者做投递。
//!
//! PUBLISH 不等待任何消费者，慢消费者和暂时不存在的消费者都不会
//! 阻塞发送方；消息的持久性由消息存储保证，不在这一层。

use std::sync::Arc;

use application::{DeliveryDispatcher, FanoutError, MessageFanout};
use async_trait::async_trait;
use domain::MessageEnvelope;
use futures_util::StreamExt;
use redis::Client;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

#[derive(Debug, Error)]
enum ListenError {
    #[error("pubsub connection failed: {0}")]
    Connection(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

pub struct RedisFanout {
    client: Client,
    channel: String,
}

impl RedisFanout {
    pub fn new(client: Client, channel: impl Into<String>) -> Self {
        Self {
            client,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl MessageFanout for RedisFanout {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), FanoutError> {
        let payload = serde_json::to_string(&envelope)
            .map_err(|err| FanoutError::publish(format!("serialize envelope: {err}")))?;

        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| FanoutError::publish(format!("redis connection: {err}")))?;

        let _: () = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|err| FanoutError::publish(format!("redis publish: {err}")))?;

        tracing::debug!(
            channel = %self.channel,
            message_id = %envelope.message.id,
            "信封已发布到扇出频道"
        );
        Ok(())
    }
}

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_BASE_DELAY_MS: u64 = 500;

/// 启动扇出订阅循环。
///
/// 连接断开时按指数退避重连；连续失败超过上限后任务退出。
pub fn spawn_fanout_listener(
    client: Client,
    dispatcher: Arc<DeliveryDispatcher>,
    channel: impl Into<String>,
) -> JoinHandle<()> {
    let channel = channel.into();
    tokio::spawn(async move {
        let mut retry = 0u32;
        loop {
            match listen(&client, &dispatcher, &channel).await {
                Ok(()) => {
                    // 订阅流正常结束（连接被服务端关闭），立即重连
                    retry = 0;
                    tracing::info!(channel = %channel, "扇出订阅流结束，重新连接");
                }
                Err(err) => {
                    retry += 1;
                    tracing::error!(error = %err, retry, "扇出订阅失败");
                    if retry >= MAX_RECONNECT_ATTEMPTS {
                        tracing::error!("扇出订阅重试次数耗尽，停止监听");
                        break;
                    }
                    let delay =
                        Duration::from_millis(RECONNECT_BASE_DELAY_MS * 2u64.pow(retry - 1));
                    sleep(delay).await;
                }
            }
        }
    })
}

async fn listen(
    client: &Client,
    dispatcher: &DeliveryDispatcher,
    channel: &str,
) -> Result<(), ListenError> {
    let mut pubsub = client
        .get_async_pubsub()
        .await
        .map_err(|err| ListenError::Connection(err.to_string()))?;
    pubsub
        .subscribe(channel)
        .await
        .map_err(|err| ListenError::Subscribe(err.to_string()))?;

    tracing::info!(channel = %channel, "扇出订阅已建立");

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "读取扇出消息负载失败");
                continue;
            }
        };

        match serde_json::from_str::<MessageEnvelope>(&payload) {
            Ok(envelope) => {
                dispatcher.dispatch(&envelope).await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "反序列化扇出信封失败");
            }
        }
    }

    Ok(())
}
