//! 长连消息流的服务端生命周期
//!
//! 打开：令牌已校验，把本连接的写端注册进会话注册表。
//! 阻塞：select 等待连接断开或注册表的强制过期信号。
//! 关闭：无论哪条路径退出都执行 `remove`（幂等），重连走全新会话。

use std::sync::Arc;

use application::{AccessClaims, MessageSink, SendError};
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use domain::MessageEnvelope;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// 会话注册表看到的流写端：把信封转投给本连接的发送任务。
///
/// 有界通道提供背压；注册表在无锁状态下调用 `send`，慢连接只会
/// 拖慢对它自己的投递。
struct WsEnvelopeSink {
    tx: mpsc::Sender<MessageEnvelope>,
}

#[async_trait]
impl MessageSink for WsEnvelopeSink {
    async fn send(&self, envelope: MessageEnvelope) -> Result<(), SendError> {
        self.tx
            .send(envelope)
            .await
            .map_err(|_| SendError::new("stream connection closed"))
    }
}

pub struct MessageStreamConnection {
    state: AppState,
    claims: AccessClaims,
}

impl MessageStreamConnection {
    pub fn new(state: AppState, claims: AccessClaims) -> Self {
        Self { state, claims }
    }

    pub async fn run(self, socket: WebSocket) {
        let subject = self.claims.subject;
        let (mut sender, mut incoming) = socket.split();

        let (tx, mut outgoing) = mpsc::channel::<MessageEnvelope>(64);
        let done = self
            .state
            .message_service
            .open_stream(&self.claims, Arc::new(WsEnvelopeSink { tx }))
            .await;

        let expired = done.expired();
        tokio::pin!(expired);

        loop {
            tokio::select! {
                // 令牌过期：注册表已移除条目，以终止性流错误结束本连接
                _ = &mut expired => {
                    tracing::info!(subject_id = %subject, "会话令牌过期，关闭消息流");
                    let _ = sender
                        .send(WsMessage::Close(Some(CloseFrame {
                            code: axum::extract::ws::close_code::POLICY,
                            reason: "token expired".into(),
                        })))
                        .await;
                    break;
                }
                // 投递来的信封写给客户端
                maybe_envelope = outgoing.recv() => {
                    let Some(envelope) = maybe_envelope else { break };
                    let payload = match serde_json::to_string(&envelope) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::warn!(error = %err, "序列化信封失败");
                            continue;
                        }
                    };
                    if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                        tracing::debug!(subject_id = %subject, "写入流失败，连接结束");
                        break;
                    }
                }
                // 客户端方向：只处理关闭与心跳
                maybe_message = incoming.next() => {
                    match maybe_message {
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(WsMessage::Ping(data))) => {
                            if sender.send(WsMessage::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            tracing::debug!(error = %err, "读取流失败，连接结束");
                            break;
                        }
                    }
                }
            }
        }

        // 两条退出路径共用的清理；对过期路径来说是幂等的重复删除
        self.state.message_service.close_stream(subject).await;
    }
}
