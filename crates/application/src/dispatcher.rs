//! 投递调度器
//!
//! 把一条已持久化的消息翻译成逐接收者的投递尝试，并对每种结局
//! 应用清理策略。任何单个接收者的失败都不会上抛到发送方的请求。

use std::sync::Arc;

use domain::{MessageEnvelope, UserId};

use crate::session::{DeliveryOutcome, SessionRegistry};

pub struct DeliveryDispatcher {
    registry: Arc<dyn SessionRegistry>,
}

impl DeliveryDispatcher {
    pub fn new(registry: Arc<dyn SessionRegistry>) -> Self {
        Self { registry }
    }

    /// 对信封中除发送者以外的每个接收者做一次本地投递尝试。
    ///
    /// 对同一接收者的调用在本方法内是顺序的；不同接收者之间没有
    /// 任何顺序保证。自投递抑制按 `sender_id` 判断，与接收者在
    /// 列表中的位置无关。
    pub async fn dispatch(&self, envelope: &MessageEnvelope) -> Vec<(UserId, DeliveryOutcome)> {
        let sender_id = envelope.sender_id();
        let mut outcomes = Vec::with_capacity(envelope.recipient_ids.len());

        for &recipient in &envelope.recipient_ids {
            if recipient == sender_id {
                continue;
            }
            let outcome = self.deliver_to(recipient, envelope).await;
            outcomes.push((recipient, outcome));
        }

        outcomes
    }

    /// 单接收者投递步骤，跨进程扇出的接收端也直接调用它。
    pub async fn deliver_to(
        &self,
        recipient: UserId,
        envelope: &MessageEnvelope,
    ) -> DeliveryOutcome {
        let outcome = self.registry.deliver(recipient, envelope).await;

        match &outcome {
            DeliveryOutcome::Delivered => {
                tracing::debug!(
                    recipient = %recipient,
                    message_id = %envelope.message.id,
                    "消息已投递"
                );
            }
            DeliveryOutcome::Unavailable => {
                // 用户不在线不是错误；转入带外推送渠道
                tracing::info!(
                    recipient = %recipient,
                    message_id = %envelope.message.id,
                    "用户未连接，转入推送通知"
                );
            }
            DeliveryOutcome::Unauthenticated => {
                // 注册表已在过期检查时移除条目
                tracing::debug!(recipient = %recipient, "会话已过期，无需额外清理");
            }
            DeliveryOutcome::SendFailed(err) => {
                // 传输层写失败意味着这条会话不再可信，由调度器清除
                tracing::warn!(
                    recipient = %recipient,
                    error = %err,
                    "投递写入失败，移除会话"
                );
                self.registry.remove(recipient).await;
            }
        }

        outcome
    }
}
