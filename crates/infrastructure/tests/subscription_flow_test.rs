//! 订阅全链路测试：应用服务 + 进程内分发器 + 内存事件存储。
//!
//! 不需要外部依赖，覆盖断线重连的积压回放、实时衔接和慢消费隔离。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use application::{
    ChatService, ChatServiceDependencies, EventBroker, EventStore, StreamError,
    SubscriptionSettings, SystemClock, TransportError,
};
use async_trait::async_trait;
use domain::{
    Event, EventId, EventPayload, NotificationLevel, RepositoryError, SubscribeRequest, UserId,
};
use infrastructure::MemoryEventBroker;
use uuid::Uuid;

/// 追加式内存事件存储。
#[derive(Default)]
struct InMemoryEventStore {
    events: Mutex<Vec<Event>>,
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn get_backlog(
        &self,
        user_id: UserId,
        since: EventId,
        limit: u32,
    ) -> Result<Vec<Event>, RepositoryError> {
        let mut events: Vec<Event> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.user_id == user_id && event.id.is_after(&since))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.id.compare(&b.id));
        events.truncate(limit as usize);
        Ok(events)
    }

    async fn append(&self, event: Event) -> Result<(), RepositoryError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

fn notification(text: &str) -> EventPayload {
    EventPayload::SystemNotification {
        text: text.to_string(),
        level: NotificationLevel::Info,
    }
}

fn build_service(
    broker: Arc<MemoryEventBroker>,
    settings: SubscriptionSettings,
) -> Arc<ChatService> {
    Arc::new(ChatService::new(ChatServiceDependencies {
        event_store: Arc::new(InMemoryEventStore::default()),
        broker,
        clock: Arc::new(SystemClock),
        settings,
    }))
}

type Delivered = Arc<Mutex<Vec<Event>>>;

async fn wait_for_deliveries(delivered: &Delivered, len: usize) {
    for _ in 0..400 {
        if delivered.lock().unwrap().len() >= len {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {len} deliveries");
}

fn collecting_send(
    delivered: Delivered,
) -> impl FnMut(Event) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), TransportError>> + Send>>
       + Send {
    move |event: Event| {
        let delivered = delivered.clone();
        Box::pin(async move {
            delivered.lock().unwrap().push(event);
            Ok(())
        })
    }
}

#[tokio::test]
async fn reconnect_replays_missed_events_then_streams_live() {
    let broker = Arc::new(MemoryEventBroker::new(8));
    let service = build_service(broker.clone(), SubscriptionSettings::default());
    let user_id = UserId::new(Uuid::new_v4());

    // 用户离线期间发布了两个事件
    let e1 = service.publish(user_id, notification("one")).await.unwrap();
    let e2 = service.publish(user_id, notification("two")).await.unwrap();

    // 携带最后已见位置 e1 重连
    let delivered: Delivered = Arc::new(Mutex::new(Vec::new()));
    let handle = {
        let service = service.clone();
        let send = collecting_send(delivered.clone());
        tokio::spawn(async move {
            service
                .subscribe(
                    SubscribeRequest {
                        user_id,
                        last_event_id: Some(e1.id),
                    },
                    send,
                )
                .await
        })
    };

    // 错过的 e2 先从积压回放
    wait_for_deliveries(&delivered, 1).await;

    // 随后的实时事件继续送达
    let e3 = service
        .publish(user_id, notification("three"))
        .await
        .unwrap();
    wait_for_deliveries(&delivered, 2).await;

    // 同一用户再次订阅会替换通道，旧订阅以 BrokerSubscriptionClosed 结束
    let _replacement = broker.subscribe(user_id).await.unwrap();
    let result = handle.await.expect("subscribe task panicked");
    assert_eq!(result, Err(StreamError::BrokerSubscriptionClosed));

    let ids: Vec<EventId> = delivered.lock().unwrap().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![e2.id, e3.id]);
}

#[tokio::test]
async fn fresh_subscription_replays_history_from_start() {
    let broker = Arc::new(MemoryEventBroker::new(8));
    let service = build_service(broker.clone(), SubscriptionSettings::default());
    let user_id = UserId::new(Uuid::new_v4());

    let e1 = service.publish(user_id, notification("one")).await.unwrap();

    let delivered: Delivered = Arc::new(Mutex::new(Vec::new()));
    let handle = {
        let service = service.clone();
        let send = collecting_send(delivered.clone());
        tokio::spawn(async move {
            service
                .subscribe(
                    SubscribeRequest {
                        user_id,
                        last_event_id: None,
                    },
                    send,
                )
                .await
        })
    };

    wait_for_deliveries(&delivered, 1).await;
    let e2 = service.publish(user_id, notification("two")).await.unwrap();
    wait_for_deliveries(&delivered, 2).await;

    let _replacement = broker.subscribe(user_id).await.unwrap();
    let result = handle.await.expect("subscribe task panicked");
    assert_eq!(result, Err(StreamError::BrokerSubscriptionClosed));

    let ids: Vec<EventId> = delivered.lock().unwrap().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![e1.id, e2.id]);
}

#[tokio::test]
async fn slow_subscriber_does_not_affect_others() {
    let broker = Arc::new(MemoryEventBroker::new(8));
    // 刻意缩小实时缓冲区，便于触发慢消费
    let service = build_service(
        broker.clone(),
        SubscriptionSettings {
            backlog_limit: 20,
            live_buffer_capacity: 2,
        },
    );
    let slow_user = UserId::new(Uuid::new_v4());
    let fast_user = UserId::new(Uuid::new_v4());

    // 慢订阅：收到第一条后发送回调永远挂起，等价于停止消费
    let slow_delivered: Delivered = Arc::new(Mutex::new(Vec::new()));
    let slow_handle = {
        let service = service.clone();
        let delivered = slow_delivered.clone();
        tokio::spawn(async move {
            service
                .subscribe(
                    SubscribeRequest {
                        user_id: slow_user,
                        last_event_id: None,
                    },
                    move |event| {
                        let delivered = delivered.clone();
                        async move {
                            delivered.lock().unwrap().push(event);
                            std::future::pending::<()>().await;
                            Ok(())
                        }
                    },
                )
                .await
        })
    };

    let delivered: Delivered = Arc::new(Mutex::new(Vec::new()));
    let fast_handle = {
        let service = service.clone();
        let send = collecting_send(delivered.clone());
        tokio::spawn(async move {
            service
                .subscribe(
                    SubscribeRequest {
                        user_id: fast_user,
                        last_event_id: None,
                    },
                    send,
                )
                .await
        })
    };

    // 等两个订阅都注册完毕
    for _ in 0..400 {
        if broker.subscriber_count().await == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // 先让慢订阅卡在第一条的发送回调里
    service
        .publish(slow_user, notification("first"))
        .await
        .unwrap();
    wait_for_deliveries(&slow_delivered, 1).await;

    // 突发超过慢订阅的缓冲容量
    for n in 0..4 {
        service
            .publish(slow_user, notification(&format!("burst-{n}")))
            .await
            .unwrap();
    }
    for n in 0..5 {
        service
            .publish(fast_user, notification(&format!("burst-{n}")))
            .await
            .unwrap();
    }

    // 快订阅不受影响，完整收到自己的事件
    wait_for_deliveries(&delivered, 5).await;

    let _replacement = broker.subscribe(fast_user).await.unwrap();
    let result = fast_handle.await.expect("fast subscribe task panicked");
    assert_eq!(result, Err(StreamError::BrokerSubscriptionClosed));
    assert_eq!(delivered.lock().unwrap().len(), 5);

    // 慢订阅只消费了一条，卡在挂起的发送回调里，其生产者已因溢出退出
    assert_eq!(slow_delivered.lock().unwrap().len(), 1);
    assert!(!slow_handle.is_finished());
    slow_handle.abort();
}
