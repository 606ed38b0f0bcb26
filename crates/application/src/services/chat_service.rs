use std::future::Future;
use std::sync::Arc;

use domain::{Event, EventId, EventPayload, SubscribeRequest, UserId};

use crate::broker::EventBroker;
use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::repository::EventStore;
use crate::subscription::{DisconnectReason, StreamCooperator, StreamError, TransportError};

/// 订阅调优参数。
///
/// 两个容量只影响内存与延迟的权衡，不承载正确性。
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionSettings {
    /// 单次订阅回放的积压事件上限
    pub backlog_limit: u32,
    /// 实时缓冲区容量，入队失败即判定慢消费
    pub live_buffer_capacity: usize,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            backlog_limit: 20,
            live_buffer_capacity: 100,
        }
    }
}

pub struct ChatServiceDependencies {
    pub event_store: Arc<dyn EventStore>,
    pub broker: Arc<dyn EventBroker>,
    pub clock: Arc<dyn Clock>,
    pub settings: SubscriptionSettings,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    /// 处理一次订阅调用。
    ///
    /// 解析游标（缺失回落到零值），先建立 broker 实时订阅、再拉取
    /// 积压；两者允许重叠，协调器的游标过滤负责去重。投递循环在
    /// 调用方任务上同步驱动；结束时关闭协调器（等生产者汇合），
    /// 再把循环的结果原样返回给调用方。
    ///
    /// 每次调用独占一个实时缓冲区和一个后台生产者，不跨调用共享。
    pub async fn subscribe<S, SFut>(
        &self,
        request: SubscribeRequest,
        send: S,
    ) -> Result<(), StreamError>
    where
        S: FnMut(Event) -> SFut,
        SFut: Future<Output = Result<(), TransportError>>,
    {
        let user_id = request.user_id;
        let cursor = request.last_event_id.unwrap_or(EventId::ZERO);

        let upstream = self.deps.broker.subscribe(user_id).await?;
        let (_signal, mut cooperator) = StreamCooperator::start(
            self.deps.settings.live_buffer_capacity,
            upstream,
            Arc::clone(&self.deps.broker),
            user_id,
        );

        tracing::debug!(user_id = %user_id, cursor = %cursor, "subscription started");

        let store = Arc::clone(&self.deps.event_store);
        let limit = self.deps.settings.backlog_limit;
        let fetch_history = move || async move {
            store
                .get_backlog(user_id, cursor, limit)
                .await
                .map_err(|err| StreamError::backlog(err.to_string()))
        };

        let result = cooperator.serve(cursor, fetch_history, send).await;

        let cause = match &result {
            Err(err) => err.clone(),
            Ok(()) => StreamError::cancelled(DisconnectReason::ClientDisconnected),
        };
        match &result {
            Err(err) if err.is_clean_close() => {
                tracing::debug!(user_id = %user_id, cause = %err, "subscription closed");
            }
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "subscription terminated");
            }
            Ok(()) => {}
        }
        cooperator.close(cause).await;

        result
    }

    /// 创建并发布一个事件：先持久化，再交给 broker 做实时分发。
    ///
    /// 实时分发失败不回滚，已持久化的事件会经积压回放补投。
    pub async fn publish(
        &self,
        user_id: UserId,
        payload: EventPayload,
    ) -> Result<Event, ApplicationError> {
        let event = Event::new(user_id, payload, self.deps.clock.now());
        self.deps.event_store.append(event.clone()).await?;

        if let Err(err) = self.deps.broker.publish(event.clone()).await {
            tracing::warn!(event_id = %event.id, error = %err, "live publish failed");
        }

        tracing::debug!(
            event_id = %event.id,
            event_type = event.event_type(),
            "event published"
        );
        Ok(event)
    }
}
