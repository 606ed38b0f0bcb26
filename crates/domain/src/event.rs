//! 订阅事件模型
//!
//! 定义投递给订阅者的事件结构与各类事件负载。

use serde::{Deserialize, Serialize};

use crate::value_objects::{ChatId, EventId, MessageId, Timestamp, UserId};

/// 消息正文类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    Text,
    // 将来扩展：图片、文件、语音
}

/// 端到端加密的消息正文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub content_type: ContentType,
    pub ciphertext: Vec<u8>,
    pub reply_to: Option<MessageId>,
}

/// 系统通知级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// 事件负载
///
/// 按事件类型划分的和类型，每种事件类型对应且仅对应一种负载形态，
/// 处理时可以穷尽匹配。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    /// 新消息
    MessageNew {
        message_id: MessageId,
        chat_id: ChatId,
        sender_id: UserId,
        content: MessageContent,
        created_at: Timestamp,
    },

    /// 消息被编辑
    MessageUpdated {
        message_id: MessageId,
        chat_id: ChatId,
        new_content: MessageContent,
        updated_at: Timestamp,
    },

    /// 消息被删除
    MessageDeleted {
        message_id: MessageId,
        chat_id: ChatId,
        deleted_at: Timestamp,
    },

    /// 正在输入指示
    TypingIndicator {
        chat_id: ChatId,
        user_id: UserId,
        is_typing: bool,
    },

    /// 已读回执
    ReadReceipt {
        chat_id: ChatId,
        user_id: UserId,
        message_id: MessageId,
        read_at: Timestamp,
    },

    /// 系统通知
    SystemNotification {
        text: String,
        level: NotificationLevel,
    },
}

impl EventPayload {
    /// 获取事件类型名称（用于日志和监控）
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::MessageNew { .. } => "message_new",
            EventPayload::MessageUpdated { .. } => "message_updated",
            EventPayload::MessageDeleted { .. } => "message_deleted",
            EventPayload::TypingIndicator { .. } => "typing_indicator",
            EventPayload::ReadReceipt { .. } => "read_receipt",
            EventPayload::SystemNotification { .. } => "system_notification",
        }
    }

    /// 获取负载关联的会话 ID
    pub fn chat_id(&self) -> Option<ChatId> {
        match self {
            EventPayload::MessageNew { chat_id, .. } => Some(*chat_id),
            EventPayload::MessageUpdated { chat_id, .. } => Some(*chat_id),
            EventPayload::MessageDeleted { chat_id, .. } => Some(*chat_id),
            EventPayload::TypingIndicator { chat_id, .. } => Some(*chat_id),
            EventPayload::ReadReceipt { chat_id, .. } => Some(*chat_id),
            EventPayload::SystemNotification { .. } => None, // 全局事件
        }
    }
}

/// 投递给订阅者的事件
///
/// `id` 为 UUIDv7：同一产生方生成的事件，ID 的字节序与 `created_at`
/// 的先后一致，订阅游标以此恢复创建顺序。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// 事件面向的接收用户
    pub user_id: UserId,
    pub payload: EventPayload,
    pub created_at: Timestamp,
}

impl Event {
    /// 创建一个新事件，在创建点分配时间有序的 ID
    pub fn new(user_id: UserId, payload: EventPayload, now: Timestamp) -> Self {
        Self {
            id: EventId::generate(),
            user_id,
            payload,
            created_at: now,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    pub fn chat_id(&self) -> Option<ChatId> {
        self.payload.chat_id()
    }
}

/// 订阅请求
#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    pub user_id: UserId,
    /// 客户端最近一次已见事件；`None` 表示没有历史位置，从头回放
    pub last_event_id: Option<EventId>,
}
