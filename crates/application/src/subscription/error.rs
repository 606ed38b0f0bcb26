use thiserror::Error;

use crate::broker::BrokerError;

/// 正常关闭一次订阅的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// 客户端断开连接
    ClientDisconnected,
    /// 调用方的截止时间到期
    Deadline,
    /// 服务端停机
    ServerShutdown,
}

/// 传输层发送失败。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// 订阅流的终止原因。
///
/// 核心内部不做任何重试：每个变体都意味着确定性的快速失败，
/// 同时保证资源清理（生产者任务汇合、broker 退订）在每条退出
/// 路径上完成。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// 实时缓冲区入队失败：消费端跟不上，整个订阅被取消
    #[error("live buffer overflow: client consumption is too slow")]
    BufferOverflow,

    /// broker 端的订阅通道已关闭
    #[error("broker subscription channel closed")]
    BrokerSubscriptionClosed,

    /// 实时缓冲区在未记录取消原因的情况下关闭；正确的停机时序下
    /// 不应出现，属于不变量被破坏
    #[error("live buffer closed unexpectedly")]
    LiveChannelClosed,

    /// 建立 broker 订阅失败
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// 拉取积压事件失败
    #[error("backlog fetch failed: {0}")]
    Backlog(String),

    /// 传输层发送失败
    #[error("transport send failed: {0}")]
    Transport(#[from] TransportError),

    /// 订阅被正常取消；记录的原因仍会返回给调用方用于日志，
    /// 由调用方映射为干净的流结束
    #[error("subscription cancelled: {reason:?}")]
    Cancelled { reason: DisconnectReason },
}

impl StreamError {
    pub fn backlog(message: impl Into<String>) -> Self {
        Self::Backlog(message.into())
    }

    pub fn cancelled(reason: DisconnectReason) -> Self {
        Self::Cancelled { reason }
    }

    /// 是否属于正常关闭，而非错误条件。
    pub fn is_clean_close(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
