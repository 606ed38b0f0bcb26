//! 应用层实现。
//!
//! 提供围绕领域模型的用例服务，以及订阅流的协调核心：
//! 历史回放与实时投递的缝合、背压与取消语义，
//! 以及对外部协作方（事件存储、事件分发器、密码哈希）的抽象。

pub mod broker;
pub mod clock;
pub mod error;
pub mod password;
pub mod repository;
pub mod services;
pub mod subscription;

pub use broker::{BrokerError, EventBroker};
pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use password::{PasswordHasher, PasswordHasherError};
pub use repository::{EventStore, UserRepository};
pub use services::{
    AuthenticateUserRequest, ChatService, ChatServiceDependencies, RegisterUserRequest,
    SubscriptionSettings, UpdateProfileRequest, UserService, UserServiceDependencies,
};
pub use subscription::{
    CancelSignal, DisconnectReason, StreamCooperator, StreamError, TransportError,
};
