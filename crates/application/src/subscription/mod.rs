//! 订阅流协调核心。
//!
//! 为一次订阅调用把两段事件流缝合成单一的有序无重复流：
//! 先回放用户断线期间错过的积压事件，再切换到实时投递。
//! 切换由游标过滤完成，而不是对两条有序流做归并：broker 的
//! 实时注册与积压拉取并发进行，实时通道可能合法地重放与积压
//! 重叠的事件，由过滤闩锁负责去重。闩锁进入实时模式后不再
//! 回退，热路径上每个事件的处理是 O(1) 且无分配的。

mod cooperator;
mod error;
mod signal;

pub use cooperator::StreamCooperator;
pub use error::{DisconnectReason, StreamError, TransportError};
pub use signal::CancelSignal;
