use async_trait::async_trait;
use domain::{Event, EventId, RepositoryError, User, UserEmail, UserId};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn update(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: UserEmail) -> Result<Option<User>, RepositoryError>;
}

/// 事件存储抽象，订阅核心只消费这一读取形态。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// 获取用户错过的积压事件。
    ///
    /// 返回严格晚于 `since` 的事件，按 ID 升序排列，至多 `limit` 条；
    /// 等于或早于 `since` 的事件必须被排除。
    async fn get_backlog(
        &self,
        user_id: UserId,
        since: EventId,
        limit: u32,
    ) -> Result<Vec<Event>, RepositoryError>;

    /// 追加一个已分配 ID 的事件。
    async fn append(&self, event: Event) -> Result<(), RepositoryError>;
}
