//! Thread subscription repository for Agora.

use crate::db::{DbPool, SQL_NOW};
use crate::{AgoraError, Result};

/// A member following a thread.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ThreadSubscription {
    pub id: i64,
    pub thread_id: i64,
    pub member_id: i64,
    /// Time of the last successful notification.
    pub last_sent: Option<String>,
    pub created_at: String,
}

/// Repository for thread subscriptions.
pub struct SubscriptionRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SubscriptionRepository<'a> {
    /// Create a new SubscriptionRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Subscribe a member to a thread.
    ///
    /// Returns true when a subscription was created, false if it already existed.
    pub async fn subscribe(&self, thread_id: i64, member_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO thread_subscriptions (thread_id, member_id) VALUES (?, ?)
             ON CONFLICT (thread_id, member_id) DO NOTHING",
        )
        .bind(thread_id)
        .bind(member_id)
        .execute(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a subscription. Returns false if there was none.
    pub async fn unsubscribe(&self, thread_id: i64, member_id: i64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM thread_subscriptions WHERE thread_id = ? AND member_id = ?")
                .bind(thread_id)
                .bind(member_id)
                .execute(self.pool)
                .await
                .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_subscribed(&self, thread_id: i64, member_id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM thread_subscriptions WHERE thread_id = ? AND member_id = ?)",
        )
        .bind(thread_id)
        .bind(member_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(exists)
    }

    /// Subscriptions of a thread, oldest first.
    pub async fn subscribers(&self, thread_id: i64) -> Result<Vec<ThreadSubscription>> {
        sqlx::query_as(
            "SELECT id, thread_id, member_id, last_sent, created_at
             FROM thread_subscriptions WHERE thread_id = ? ORDER BY id",
        )
        .bind(thread_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))
    }

    /// Threads a member follows.
    pub async fn threads_of(&self, member_id: i64) -> Result<Vec<i64>> {
        sqlx::query_scalar(
            "SELECT thread_id FROM thread_subscriptions WHERE member_id = ? ORDER BY thread_id",
        )
        .bind(member_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))
    }

    /// Members following a thread, other than `exclude_member`.
    pub async fn recipient_ids(
        &self,
        thread_id: i64,
        exclude_member: Option<i64>,
    ) -> Result<Vec<i64>> {
        sqlx::query_scalar(
            "SELECT member_id FROM thread_subscriptions
             WHERE thread_id = ? AND member_id != COALESCE(?, -1)
             ORDER BY id",
        )
        .bind(thread_id)
        .bind(exclude_member)
        .fetch_all(self.pool)
        .await
        .map_err(|e| AgoraError::Database(e.to_string()))
    }

    /// Record a successful notification.
    pub async fn touch_last_sent(&self, thread_id: i64, member_id: i64) -> Result<bool> {
        let sql = format!(
            "UPDATE thread_subscriptions SET last_sent = {SQL_NOW} WHERE thread_id = ? AND member_id = ?"
        );
        let result = sqlx::query(&sql)
            .bind(thread_id)
            .bind(member_id)
            .execute(self.pool)
            .await
            .map_err(|e| AgoraError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}
