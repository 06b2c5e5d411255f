//! 会话注册表
//!
//! 单节点上“身份 -> 存活下行流”的唯一事实来源。每个身份至多一条
//! 会话；同一身份再次注册时直接覆盖旧条目（last-register-wins），
//! 注册表不去关闭旧的物理流，旧流的等待任务由它自己的连接取消
//! 收尾。过期采用惰性检查：没有后台清扫定时器，`deliver` 在命中
//! 条目时比较 `expires_at`，过期即移除并触发 done 信号。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{MessageEnvelope, Timestamp, UserId};
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};

use crate::clock::Clock;

/// 传输层写入失败。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("send failed: {message}")]
pub struct SendError {
    pub message: String,
}

impl SendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// 一条存活流的写端能力，由传输层实现。
///
/// `send` 可能因背压而阻塞；注册表保证不在持锁状态下调用它。
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, envelope: MessageEnvelope) -> Result<(), SendError>;
}

/// 单次投递的结局。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 写入成功。
    Delivered,
    /// 该身份在本节点没有存活会话。这是预期的“用户离线”路径，
    /// 调用方据此转入带外通知渠道，不按错误处理。
    Unavailable,
    /// 会话存在但令牌已过期；注册表已顺手移除条目并触发 done。
    Unauthenticated,
    /// 传输层写入失败；条目保留，是否清除由调度器决定。
    SendFailed(SendError),
}

/// 强制过期信号的接收端。
///
/// 每条流的服务端任务阻塞在它与连接取消之间的 select 上。信号只在
/// `deliver` 的惰性过期路径上触发；条目被覆盖或显式移除时发送端被
/// 丢弃，此时 `expired` 永远挂起——旧任务只能由自己的连接取消唤醒，
/// 不能因为别人顶替了条目就去执行清理。
pub struct DoneSignal {
    rx: oneshot::Receiver<()>,
}

impl DoneSignal {
    /// 等待强制过期。仅在会话因令牌过期被注册表移除时返回。
    pub async fn expired(self) {
        match self.rx.await {
            Ok(()) => {}
            // 发送端被丢弃（条目覆盖/移除），保持挂起
            Err(_) => std::future::pending::<()>().await,
        }
    }
}

struct SessionEntry {
    sink: Arc<dyn MessageSink>,
    expires_at: Timestamp,
    done: Option<oneshot::Sender<()>>,
}

/// 会话注册表接口。所有会话状态的变更都经过这三个操作。
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// 插入或覆盖 `subject_id` 的会话条目，返回调用方应当阻塞等待的
    /// 过期信号。
    async fn register(
        &self,
        subject_id: UserId,
        sink: Arc<dyn MessageSink>,
        expires_at: Timestamp,
    ) -> DoneSignal;

    /// 尝试向 `subject_id` 的存活流投递一只信封。
    async fn deliver(&self, subject_id: UserId, envelope: &MessageEnvelope) -> DeliveryOutcome;

    /// 无条件移除条目；条目不存在时不是错误。
    async fn remove(&self, subject_id: UserId);
}

/// 互斥锁保护的内存实现。
///
/// 预期基数下全表一把锁足够；唯一的硬要求是绝不把锁跨越到
/// `sink.send` 的 await 上，否则一条慢连接会拖住整个注册表。
pub struct InMemorySessionRegistry {
    sessions: Mutex<HashMap<UserId, SessionEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemorySessionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// 当前注册的会话数量（诊断用）。
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn register(
        &self,
        subject_id: UserId,
        sink: Arc<dyn MessageSink>,
        expires_at: Timestamp,
    ) -> DoneSignal {
        let (tx, rx) = oneshot::channel();
        let entry = SessionEntry {
            sink,
            expires_at,
            done: Some(tx),
        };

        let mut sessions = self.sessions.lock().await;
        if sessions.insert(subject_id, entry).is_some() {
            tracing::debug!(subject_id = %subject_id, "会话条目被新连接覆盖");
        }
        drop(sessions);

        DoneSignal { rx }
    }

    async fn deliver(&self, subject_id: UserId, envelope: &MessageEnvelope) -> DeliveryOutcome {
        // 持锁期间只做查表和过期判断，把 sink 拷出来之后再发送
        let sink = {
            let mut sessions = self.sessions.lock().await;
            let Some(entry) = sessions.get(&subject_id) else {
                return DeliveryOutcome::Unavailable;
            };

            if self.clock.now() >= entry.expires_at {
                if let Some(mut entry) = sessions.remove(&subject_id) {
                    drop(sessions);
                    if let Some(done) = entry.done.take() {
                        let _ = done.send(());
                    }
                }
                tracing::debug!(subject_id = %subject_id, "会话令牌过期，条目已移除");
                return DeliveryOutcome::Unauthenticated;
            }

            Arc::clone(&entry.sink)
        };

        match sink.send(envelope.clone()).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(err) => DeliveryOutcome::SendFailed(err),
        }
    }

    async fn remove(&self, subject_id: UserId) {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(&subject_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use domain::{Message, MessageContent, RoomId, UserId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;
    use uuid::Uuid;

    /// 记录收到信封的测试 sink。
    struct RecordingSink {
        envelopes: AsyncMutex<Vec<MessageEnvelope>>,
        sends: AtomicUsize,
        fail: bool,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                envelopes: AsyncMutex::new(Vec::new()),
                sends: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                envelopes: AsyncMutex::new(Vec::new()),
                sends: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn send_count(&self) -> usize {
            self.sends.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&self, envelope: MessageEnvelope) -> Result<(), SendError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SendError::new("connection reset"));
            }
            self.envelopes.lock().await.push(envelope);
            Ok(())
        }
    }

    fn envelope_to(recipient: UserId, text: &str) -> MessageEnvelope {
        let sender = UserId::new(Uuid::new_v4());
        let message = Message::new(
            RoomId::new(Uuid::new_v4()),
            sender,
            MessageContent::new(text).unwrap(),
            chrono::Utc::now(),
        );
        MessageEnvelope::new(message, vec![recipient])
    }

    fn registry() -> InMemorySessionRegistry {
        InMemorySessionRegistry::new(Arc::new(SystemClock))
    }

    fn far_future() -> Timestamp {
        chrono::Utc::now() + chrono::Duration::hours(1)
    }

    #[tokio::test]
    async fn register_then_deliver_hits_sink_once() {
        let registry = registry();
        let subject = UserId::new(Uuid::new_v4());
        let sink = RecordingSink::new();

        let _done = registry
            .register(subject, sink.clone(), far_future())
            .await;
        let envelope = envelope_to(subject, "hello");
        let outcome = registry.deliver(subject, &envelope).await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(sink.send_count(), 1);
        assert_eq!(sink.envelopes.lock().await[0], envelope);
    }

    #[tokio::test]
    async fn deliver_without_session_is_unavailable() {
        let registry = registry();
        let subject = UserId::new(Uuid::new_v4());
        let envelope = envelope_to(subject, "hello");

        assert_eq!(
            registry.deliver(subject, &envelope).await,
            DeliveryOutcome::Unavailable
        );
    }

    #[tokio::test]
    async fn expired_session_is_purged_and_done_fires() {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let registry = InMemorySessionRegistry::new(clock.clone());
        let subject = UserId::new(Uuid::new_v4());
        let sink = RecordingSink::new();

        let expires_at = clock.now() + chrono::Duration::minutes(5);
        let done = registry.register(subject, sink.clone(), expires_at).await;

        clock.advance(chrono::Duration::minutes(10));
        let envelope = envelope_to(subject, "late");

        assert_eq!(
            registry.deliver(subject, &envelope).await,
            DeliveryOutcome::Unauthenticated
        );
        // 过期路径必须触发 done 信号
        tokio::time::timeout(std::time::Duration::from_secs(1), done.expired())
            .await
            .expect("done signal should fire on expiry");

        // 条目已被清除，再投递回到离线路径
        assert_eq!(
            registry.deliver(subject, &envelope).await,
            DeliveryOutcome::Unavailable
        );
        assert_eq!(sink.send_count(), 0);
    }

    #[tokio::test]
    async fn second_register_replaces_first() {
        let registry = registry();
        let subject = UserId::new(Uuid::new_v4());
        let first = RecordingSink::new();
        let second = RecordingSink::new();

        let first_done = registry
            .register(subject, first.clone(), far_future())
            .await;
        let _second_done = registry
            .register(subject, second.clone(), far_future())
            .await;

        let envelope = envelope_to(subject, "to the new stream");
        assert_eq!(
            registry.deliver(subject, &envelope).await,
            DeliveryOutcome::Delivered
        );
        assert_eq!(first.send_count(), 0);
        assert_eq!(second.send_count(), 1);

        // 被顶替的等待者不能被唤醒
        let woke = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            first_done.expired(),
        )
        .await;
        assert!(woke.is_err(), "replaced DoneSignal must stay pending");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = registry();
        let subject = UserId::new(Uuid::new_v4());

        registry.remove(subject).await;

        let sink = RecordingSink::new();
        let _done = registry.register(subject, sink, far_future()).await;
        registry.remove(subject).await;
        registry.remove(subject).await;

        assert!(registry.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_delivers_hit_sink_exactly_n_times() {
        let registry = Arc::new(registry());
        let subject = UserId::new(Uuid::new_v4());
        let sink = RecordingSink::new();
        let _done = registry
            .register(subject, sink.clone(), far_future())
            .await;

        const N: usize = 64;
        let mut handles = Vec::with_capacity(N);
        for i in 0..N {
            let registry = Arc::clone(&registry);
            let envelope = envelope_to(subject, &format!("message {i}"));
            handles.push(tokio::spawn(async move {
                registry.deliver(subject, &envelope).await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), DeliveryOutcome::Delivered);
        }
        assert_eq!(sink.send_count(), N);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn send_failure_keeps_entry_in_place() {
        let registry = registry();
        let subject = UserId::new(Uuid::new_v4());
        let sink = RecordingSink::failing();
        let _done = registry
            .register(subject, sink.clone(), far_future())
            .await;

        let envelope = envelope_to(subject, "doomed");
        match registry.deliver(subject, &envelope).await {
            DeliveryOutcome::SendFailed(_) => {}
            other => panic!("expected SendFailed, got {other:?}"),
        }
        // 移除与否是调度器的决定，注册表自己不动条目
        assert_eq!(registry.len().await, 1);
    }
}
