use std::future::Future;
use std::sync::Arc;

use domain::{Event, EventId, UserId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use super::error::{DisconnectReason, StreamError, TransportError};
use super::signal::CancelSignal;
use crate::broker::EventBroker;

/// 回放/实时双阶段的流协调器。
///
/// 独占持有单个订阅的实时缓冲区和后台生产者的生命周期，驱动
/// 消费循环：先按拉取顺序投递积压事件，随后从实时缓冲区读取，
/// 用游标过滤掉已被积压覆盖的重放，直到第一个严格晚于游标的
/// 事件出现；此后进入实时模式，不再过滤。`replaying -> live`
/// 是仅发生一次的单向切换。
///
/// 状态全部归属于一次订阅调用，不跨调用、跨用户共享。
pub struct StreamCooperator {
    live_rx: mpsc::Receiver<Event>,
    signal: CancelSignal,
    producer: Option<JoinHandle<()>>,
    live_mode: bool,
}

impl StreamCooperator {
    /// 分配给定容量的实时缓冲区，启动后台生产者，返回共享的
    /// 取消信号和协调器。
    ///
    /// 必须在 broker 侧订阅建立之后调用；`upstream` 即 broker
    /// 返回的每用户通道。
    pub fn start(
        capacity: usize,
        upstream: mpsc::Receiver<Event>,
        broker: Arc<dyn EventBroker>,
        user_id: UserId,
    ) -> (CancelSignal, Self) {
        let (live_tx, live_rx) = mpsc::channel(capacity);
        let signal = CancelSignal::new();
        let producer = spawn_producer(signal.clone(), live_tx, upstream, broker, user_id);

        (
            signal.clone(),
            Self {
                live_rx,
                signal,
                producer: Some(producer),
                live_mode: false,
            },
        )
    }

    #[cfg(test)]
    pub(crate) fn from_parts(signal: CancelSignal, live_rx: mpsc::Receiver<Event>) -> Self {
        Self {
            live_rx,
            signal,
            producer: None,
            live_mode: false,
        }
    }

    /// 投递循环，由请求处理任务同步驱动。
    ///
    /// `cursor` 是调用方的原始游标；积压投递会把它推进到最后一条
    /// 已投递事件的 ID，积压为空时保持原值。循环没有隐式超时，
    /// 生命周期由共享取消信号决定。
    pub async fn serve<F, Fut, S, SFut>(
        &mut self,
        cursor: EventId,
        fetch_history: F,
        mut send: S,
    ) -> Result<(), StreamError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Event>, StreamError>>,
        S: FnMut(Event) -> SFut,
        SFut: Future<Output = Result<(), TransportError>>,
    {
        let backlog = fetch_history().await?;

        let mut cursor = cursor;
        for event in backlog {
            cursor = event.id;
            send(event).await?;
        }

        let signal = self.signal.clone();
        loop {
            tokio::select! {
                biased;

                cause = signal.cancelled() => return Err(cause),

                received = self.live_rx.recv() => match received {
                    None => {
                        // 生产者退出前总会记录原因；没有原因的关闭
                        // 意味着停机时序的不变量被破坏
                        return Err(signal.cause().unwrap_or(StreamError::LiveChannelClosed));
                    }
                    Some(event) => {
                        if !self.live_mode {
                            if !event.id.is_after(&cursor) {
                                // 已被积压覆盖或先于订阅，静默丢弃
                                continue;
                            }
                            self.live_mode = true;
                        }
                        send(event).await?;
                    }
                },
            }
        }
    }

    /// 记录取消原因并等待后台生产者完全退出。
    ///
    /// 返回后保证没有遗留任务，broker 退订已经完成。
    pub async fn close(&mut self, cause: StreamError) {
        self.signal.cancel(cause);
        if let Some(producer) = self.producer.take() {
            if let Err(err) = producer.await {
                tracing::warn!(error = %err, "subscription producer task failed");
            }
        }
    }
}

impl Drop for StreamCooperator {
    fn drop(&mut self) {
        // 调用方可能不经 close 直接丢弃订阅（客户端断连）；
        // 取消信号让游离的生产者退出并完成退订
        self.signal
            .cancel(StreamError::cancelled(DisconnectReason::ClientDisconnected));
    }
}

/// 后台生产者：把 broker 的每用户通道灌入实时缓冲区。
///
/// 入队是非阻塞的，这是整个背压机制：慢消费者不会拖住 broker
/// 或生产者，代价是自己的订阅被致命取消。每条退出路径都执行
/// 且仅执行一次 broker 退订。
fn spawn_producer(
    signal: CancelSignal,
    live_tx: mpsc::Sender<Event>,
    mut upstream: mpsc::Receiver<Event>,
    broker: Arc<dyn EventBroker>,
    user_id: UserId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = signal.cancelled() => break,

                received = upstream.recv() => match received {
                    None => {
                        signal.cancel(StreamError::BrokerSubscriptionClosed);
                        break;
                    }
                    Some(event) => match live_tx.try_send(event) {
                        Ok(()) => {}
                        Err(TrySendError::Full(event)) => {
                            tracing::warn!(
                                user_id = %user_id,
                                event_id = %event.id,
                                "live buffer full, cancelling slow subscription"
                            );
                            signal.cancel(StreamError::BufferOverflow);
                            break;
                        }
                        // 消费端已放弃订阅，取消信号随之到来
                        Err(TrySendError::Closed(_)) => break,
                    },
                },
            }
        }

        // 与退出路径无关，broker 退订恰好执行一次
        if let Err(err) = broker.unsubscribe(user_id).await {
            tracing::warn!(user_id = %user_id, error = %err, "broker unsubscribe failed");
        }
    })
}
