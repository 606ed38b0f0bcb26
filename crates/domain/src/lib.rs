//! 聊天事件系统核心领域模型
//!
//! 包含用户实体、事件模型与标识类型，以及相关的校验规则。

pub mod errors;
pub mod event;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use event::*;
pub use user::*;
pub use value_objects::*;
