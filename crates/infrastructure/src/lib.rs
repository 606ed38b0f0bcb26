//! 基础设施层实现。
//!
//! 提供数据库仓储、事件存储、进程内事件分发器和密码哈希等适配器，
//! 实现应用层定义的接口。

pub mod event_storage;
pub mod memory_broker;
pub mod password;
pub mod repository;

pub use event_storage::PgEventStore;
pub use memory_broker::MemoryEventBroker;
pub use password::BcryptPasswordHasher;
pub use repository::{create_pg_pool, PgUserRepository};
