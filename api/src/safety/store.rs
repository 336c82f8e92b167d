use std::future::Future;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// The columns of `user_crisis_state` the tracker reasons about. The table
/// also carries an `updated_at` audit column that never participates in
/// logic. `last_crisis_at` is the sole source of truth for whether tracking
/// is active; after an exit the source/tag columns stay behind as history.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredCrisisState {
    pub last_crisis_at: Option<DateTime<Utc>>,
    pub last_crisis_source: String,
    pub last_crisis_tag: String,
    pub safe_messages_since: i32,
}

#[derive(Debug, thiserror::Error)]
#[error("crisis state store error: {0}")]
pub struct StoreError(#[from] pub sqlx::Error);

/// Seam between the tracker and Postgres. Every operation takes the store
/// explicitly, so tests run against an in-memory (or failing) fake instead
/// of a live database.
///
/// Writes are single-row upserts/updates keyed by `user_id`; concurrent
/// messages for the same user rely on the database's row-level atomicity
/// rather than any locking here.
pub trait CrisisStore: Sync {
    fn fetch(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Option<StoredCrisisState>, StoreError>> + Send;

    /// Upsert the row into crisis state: `last_crisis_at = now`, counter
    /// reset to 0.
    fn flag(
        &self,
        user_id: Uuid,
        source: &str,
        tag: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persist an advanced safe-message counter, leaving `last_crisis_at`
    /// untouched.
    fn record_safe_message(
        &self,
        user_id: Uuid,
        safe_messages_since: i32,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Exit crisis state. The row survives as history; only the flag and
    /// counter are reset.
    fn clear(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl CrisisStore for PgPool {
    async fn fetch(&self, user_id: Uuid) -> Result<Option<StoredCrisisState>, StoreError> {
        sqlx::query_as::<_, StoredCrisisState>(
            "SELECT last_crisis_at, last_crisis_source, last_crisis_tag, safe_messages_since \
             FROM user_crisis_state WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(self)
        .await
        .map_err(StoreError)
    }

    async fn flag(
        &self,
        user_id: Uuid,
        source: &str,
        tag: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_crisis_state \
                 (user_id, last_crisis_at, last_crisis_source, last_crisis_tag, \
                  safe_messages_since, updated_at) \
             VALUES ($1, $2, $3, $4, 0, $2) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 last_crisis_at = EXCLUDED.last_crisis_at, \
                 last_crisis_source = EXCLUDED.last_crisis_source, \
                 last_crisis_tag = EXCLUDED.last_crisis_tag, \
                 safe_messages_since = 0, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(user_id)
        .bind(now)
        .bind(source)
        .bind(tag)
        .execute(self)
        .await?;

        Ok(())
    }

    async fn record_safe_message(
        &self,
        user_id: Uuid,
        safe_messages_since: i32,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE user_crisis_state \
             SET safe_messages_since = $2, updated_at = $3 \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(safe_messages_since)
        .bind(now)
        .execute(self)
        .await?;

        Ok(())
    }

    async fn clear(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE user_crisis_state \
             SET last_crisis_at = NULL, safe_messages_since = 0, updated_at = $2 \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(now)
        .execute(self)
        .await?;

        Ok(())
    }
}
