use std::collections::HashMap;

use application::{BrokerError, EventBroker};
use async_trait::async_trait;
use domain::{Event, UserId};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// 进程内事件分发器。
///
/// 每个在线用户一条有界通道；订阅即注册发送端，发布时查表投递。
/// 不在线的用户直接跳过，错过的事件由事件存储的积压回放补齐，
/// 这正是订阅核心假定的"自注册时刻起至少一次"合同。
///
/// 同一用户重新订阅会替换旧通道：旧订阅的上游随之关闭，其生产者
/// 迟到的退订不会误删新注册（只有通道已关闭的注册才会被移除）。
pub struct MemoryEventBroker {
    capacity: usize,
    senders: RwLock<HashMap<UserId, mpsc::Sender<Event>>>,
}

impl MemoryEventBroker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            senders: RwLock::new(HashMap::new()),
        }
    }

    /// 当前注册的订阅数（用于监控；已死通道在下一次发布时清理）。
    pub async fn subscriber_count(&self) -> usize {
        self.senders.read().await.len()
    }
}

#[async_trait]
impl EventBroker for MemoryEventBroker {
    async fn subscribe(&self, user_id: UserId) -> Result<mpsc::Receiver<Event>, BrokerError> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut senders = self.senders.write().await;
        if senders.insert(user_id, tx).is_some() {
            debug!(user_id = %user_id, "replaced stale subscription");
        }
        Ok(rx)
    }

    async fn unsubscribe(&self, user_id: UserId) -> Result<(), BrokerError> {
        // 幂等：只移除已关闭的注册，重复调用或已被替换都安全
        let mut senders = self.senders.write().await;
        if let Some(sender) = senders.get(&user_id) {
            if sender.is_closed() {
                senders.remove(&user_id);
            }
        }
        Ok(())
    }

    async fn publish(&self, event: Event) -> Result<(), BrokerError> {
        let sender = {
            let senders = self.senders.read().await;
            senders.get(&event.user_id).cloned()
        };

        let Some(sender) = sender else {
            return Ok(());
        };

        match sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(event)) => {
                // 接收端已消失，顺手清理注册
                let mut senders = self.senders.write().await;
                if senders
                    .get(&event.user_id)
                    .map_or(false, |tx| tx.is_closed())
                {
                    senders.remove(&event.user_id);
                }
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                // 通道满说明该订阅的生产者已停止抽取，订阅正在消亡；
                // 丢弃而不是阻塞发布方
                warn!(
                    user_id = %event.user_id,
                    event_id = %event.id,
                    "subscriber channel full, dropping event"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{EventId, EventPayload, NotificationLevel};
    use uuid::Uuid;

    fn test_user(n: u128) -> UserId {
        UserId::new(Uuid::from_u128(n))
    }

    fn test_event(user_id: UserId, text: &str) -> Event {
        Event {
            id: EventId::generate(),
            user_id,
            payload: EventPayload::SystemNotification {
                text: text.to_string(),
                level: NotificationLevel::Info,
            },
            created_at: time::OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let broker = MemoryEventBroker::new(8);
        let user = test_user(1);

        let mut rx = broker.subscribe(user).await.unwrap();
        let event = test_event(user, "hello");
        broker.publish(event.clone()).await.unwrap();

        assert_eq!(rx.recv().await, Some(event));
    }

    #[tokio::test]
    async fn publish_to_offline_user_is_noop() {
        let broker = MemoryEventBroker::new(8);
        let result = broker.publish(test_event(test_user(1), "nobody")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn events_are_delivered_per_user() {
        let broker = MemoryEventBroker::new(8);
        let alice = test_user(1);
        let bob = test_user(2);

        let mut alice_rx = broker.subscribe(alice).await.unwrap();
        let mut bob_rx = broker.subscribe(bob).await.unwrap();

        broker.publish(test_event(alice, "for alice")).await.unwrap();
        broker.publish(test_event(bob, "for bob")).await.unwrap();

        assert_eq!(alice_rx.recv().await.unwrap().user_id, alice);
        assert_eq!(bob_rx.recv().await.unwrap().user_id, bob);
    }

    #[tokio::test]
    async fn resubscribe_replaces_old_channel() {
        let broker = MemoryEventBroker::new(8);
        let user = test_user(1);

        let mut old_rx = broker.subscribe(user).await.unwrap();
        let mut new_rx = broker.subscribe(user).await.unwrap();

        // 旧通道因替换而关闭
        assert_eq!(old_rx.recv().await, None);

        // 旧订阅迟到的退订不能驱逐新注册
        broker.unsubscribe(user).await.unwrap();
        let event = test_event(user, "after reconnect");
        broker.publish(event.clone()).await.unwrap();
        assert_eq!(new_rx.recv().await, Some(event));
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_after_close() {
        let broker = MemoryEventBroker::new(8);
        let user = test_user(1);

        let rx = broker.subscribe(user).await.unwrap();
        drop(rx);

        broker.unsubscribe(user).await.unwrap();
        broker.unsubscribe(user).await.unwrap();
        assert_eq!(broker.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn publish_cleans_up_dead_channels() {
        let broker = MemoryEventBroker::new(8);
        let user = test_user(1);

        let rx = broker.subscribe(user).await.unwrap();
        drop(rx);
        assert_eq!(broker.subscriber_count().await, 1);

        broker.publish(test_event(user, "into the void")).await.unwrap();
        assert_eq!(broker.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let broker = MemoryEventBroker::new(1);
        let user = test_user(1);

        let mut rx = broker.subscribe(user).await.unwrap();
        let first = test_event(user, "first");
        broker.publish(first.clone()).await.unwrap();
        // 第二条在零消费下被丢弃，发布方不会被拖住
        broker.publish(test_event(user, "second")).await.unwrap();

        assert_eq!(rx.recv().await, Some(first));
        assert_eq!(broker.subscriber_count().await, 1);
    }
}
