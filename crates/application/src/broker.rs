use async_trait::async_trait;
use domain::{Event, UserId};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("unsubscribe failed: {0}")]
    Unsubscribe(String),
    #[error("publish failed: {0}")]
    Publish(String),
}

impl BrokerError {
    pub fn subscribe(message: impl Into<String>) -> Self {
        Self::Subscribe(message.into())
    }

    pub fn unsubscribe(message: impl Into<String>) -> Self {
        Self::Unsubscribe(message.into())
    }

    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish(message.into())
    }
}

/// 事件分发器抽象。
///
/// 对实现方的要求：`subscribe` 返回的通道从注册时刻起至少一次投递
/// 发布给该用户的事件；`unsubscribe` 幂等，重复调用或在通道已关闭后
/// 调用都必须安全。
#[async_trait]
pub trait EventBroker: Send + Sync {
    /// 为用户建立一条实时事件通道。
    async fn subscribe(&self, user_id: UserId) -> Result<mpsc::Receiver<Event>, BrokerError>;

    /// 撤销用户的实时订阅。
    async fn unsubscribe(&self, user_id: UserId) -> Result<(), BrokerError>;

    /// 向目标用户的在线订阅投递事件。
    async fn publish(&self, event: Event) -> Result<(), BrokerError>;
}
