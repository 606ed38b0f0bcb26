use application::EventStore;
use async_trait::async_trait;
use domain::{Event, EventId, EventPayload, RepositoryError, UserId};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::repository::map_sqlx_err;

#[derive(Debug, FromRow)]
struct EventRecord {
    id: Uuid,
    user_id: Uuid,
    payload: serde_json::Value,
    created_at: OffsetDateTime,
}

impl TryFrom<EventRecord> for Event {
    type Error = RepositoryError;

    fn try_from(value: EventRecord) -> Result<Self, Self::Error> {
        let payload: EventPayload = serde_json::from_value(value.payload)
            .map_err(|err| RepositoryError::storage(err.to_string()))?;

        Ok(Event {
            id: EventId::from(value.id),
            user_id: UserId::from(value.user_id),
            payload,
            created_at: value.created_at,
        })
    }
}

/// PostgreSQL 实现的事件存储。
///
/// 积压查询依赖 Postgres 的 UUID 比较即 16 字节字典序这一事实，
/// 与领域层事件 ID 的比较器一致。
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn get_backlog(
        &self,
        user_id: UserId,
        since: EventId,
        limit: u32,
    ) -> Result<Vec<Event>, RepositoryError> {
        let records = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT id, user_id, payload, created_at
            FROM events
            WHERE user_id = $1 AND id > $2
            ORDER BY id ASC
            LIMIT $3
            "#,
        )
        .bind(Uuid::from(user_id))
        .bind(Uuid::from(since))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Event::try_from).collect()
    }

    async fn append(&self, event: Event) -> Result<(), RepositoryError> {
        let payload = serde_json::to_value(&event.payload)
            .map_err(|err| RepositoryError::storage(err.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO events (id, user_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::from(event.id))
        .bind(Uuid::from(event.user_id))
        .bind(event.event_type())
        .bind(payload)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }
}
