use std::sync::Arc;

use tokio::sync::watch;

use super::error::StreamError;

/// 单个订阅共享的取消信号。
///
/// 携带取消原因的可取消上下文：任何一方（后台生产者、协调器、
/// 调用方）都可以取消，只有第一个记录的原因生效，后到的原因被
/// 忽略。克隆共享同一状态。
#[derive(Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<Option<StreamError>>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// 记录取消原因并唤醒所有等待者；只有第一个原因生效。
    pub fn cancel(&self, cause: StreamError) {
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(cause);
                true
            } else {
                false
            }
        });
    }

    /// 已记录的取消原因。
    pub fn cause(&self) -> Option<StreamError> {
        self.tx.borrow().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// 挂起直到信号被取消，返回记录的原因。
    pub async fn cancelled(&self) -> StreamError {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(cause) = rx.borrow_and_update().clone() {
                return cause;
            }
            // 发送端由本信号持有，changed 只会因取消通知返回
            let _ = rx.changed().await;
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::DisconnectReason;

    #[tokio::test]
    async fn first_cause_wins() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());

        signal.cancel(StreamError::BufferOverflow);
        signal.cancel(StreamError::cancelled(DisconnectReason::ServerShutdown));

        assert_eq!(signal.cause(), Some(StreamError::BufferOverflow));
        assert_eq!(signal.cancelled().await, StreamError::BufferOverflow);
    }

    #[tokio::test]
    async fn cancelled_wakes_pending_waiters() {
        let signal = CancelSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };

        signal.cancel(StreamError::BrokerSubscriptionClosed);

        let cause = waiter.await.expect("waiter task panicked");
        assert_eq!(cause, StreamError::BrokerSubscriptionClosed);
    }
}
